pub mod types;
pub mod builtin;
pub mod loader;
pub mod validator;
pub mod resolved;

pub use types::*;
pub use builtin::{IDENTITY_CLASS, AUTHENTICATION_FIELD};
pub use loader::*;
pub use validator::*;
pub use resolved::*;
