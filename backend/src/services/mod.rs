pub mod memory_store;
pub mod session;
pub mod session_store;
pub mod token_issuer;

pub use memory_store::*;
pub use session::*;
pub use session_store::*;
pub use token_issuer::*;
