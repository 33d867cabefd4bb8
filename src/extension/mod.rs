//! The Extension Channel: the bridge's single connection to the browser
//! extension.

mod channel;
mod wire;

pub use channel::{ExtensionChannel, ExtensionLifecycle};
pub use wire::{ExtensionEvent, ExtensionInbound, ExtensionReply, ExtensionRequest};
