pub mod codec;
pub mod handler;
pub mod msg_chatmessage_handler;
pub mod msg_comment_handler;
pub mod msg_like_handler;
pub mod session;

pub use handler::relay_handler;
pub use session::{ClientSession, SessionState};
