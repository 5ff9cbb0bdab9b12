//! Classbase SDK: schema-driven CRUD API compiler with a hook pipeline and pluggable storage.

pub mod case;
pub mod compiler;
pub mod config;
pub mod error;
pub mod filter;
pub mod hooks;
pub mod response;
pub mod service;
pub mod sql;
pub mod state;
pub mod store;

pub use compiler::{compile, compile_shapes, CompiledApi, FnResolver, OperationCall, Resolver, ResolverMap};
pub use config::{load_from_path, load_from_str, resolve, SchemaConfig, SchemaRegistry};
pub use error::{AppError, ConfigError, OperationError, StoreError};
pub use filter::FilterExpression;
pub use hooks::{AuthenticationHook, CredentialProvider, FnHook, Hook, HookEvent, HookObject, HookPipeline};
pub use response::OperationResponse;
pub use service::{CallContext, Controller, CrudEngine, StoredObject};
pub use state::AppState;
pub use store::{ensure_database_exists, MemoryAdapter, Page, PostgresAdapter, StorageAdapter};
