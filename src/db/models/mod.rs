//! Database models split into separate files.

pub mod boxes;
pub mod client;
pub mod notification;

pub use self::boxes::*;
pub use self::client::*;
pub use self::notification::*;
