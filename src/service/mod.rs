//! Services: CRUD engine, hook-wrapped controller, permissions and request validation.

mod controller;
mod crud;
mod permissions;
mod validation;

pub use controller::Controller;
pub use crud::{CrudEngine, StoredObject};
pub use permissions::{authorize, CallContext};
pub use validation::{value_eq, RequestValidator};
