pub mod chat;
pub mod club;
pub mod diagnostics;
pub mod error;
pub mod health;
pub mod messages;

pub use chat::*;
pub use club::*;
pub use diagnostics::*;
pub use error::*;
pub use health::*;
pub use messages::*;
