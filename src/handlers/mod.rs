pub mod club;
pub mod diagnostics;
pub mod health;

pub use club::*;
pub use diagnostics::*;
pub use health::*;
