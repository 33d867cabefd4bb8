//! Network endpoints (spec.md §6, §2 items 4/5/6): one module per listener,
//! all sharing the same `Bridge`/`Router` the Supervisor constructs once at
//! startup.

pub mod brop_server;
pub mod cdp_server;
pub mod discovery_http;
pub mod extension_server;
