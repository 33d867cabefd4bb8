//! Wire dialects the bridge speaks: CDP and BROP (spec §4.3, §4.4, §6).

pub mod brop;
pub mod cdp;
