pub mod device;
pub mod jwt;
pub mod password;

pub use device::*;
pub use jwt::*;
pub use password::*;
