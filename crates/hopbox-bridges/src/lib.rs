//! Client-side bridge listeners: long-lived local TCP services that turn
//! remote-side events into native side effects (§4.5).

mod bridge;
mod clipboard;
mod common;
mod devtools;
mod error;
mod notification;
mod url_open;

pub use bridge::Bridge;
pub use clipboard::ClipboardBridge;
pub use devtools::DevToolsBridge;
pub use error::BridgeError;
pub use notification::NotificationBridge;
pub use url_open::UrlOpenBridge;
