//! Shared application state: registry, engine, controller and compiled API, built in one
//! initialization phase and read-only afterwards.

use crate::compiler::{compile, CompiledApi, OperationCall, ResolverMap};
use crate::config::{resolve, SchemaConfig, SchemaRegistry};
use crate::error::{AppError, OperationError};
use crate::hooks::HookPipeline;
use crate::response::OperationResponse;
use crate::service::{Controller, CrudEngine};
use crate::store::StorageAdapter;
use serde_json::Value;
use std::sync::Arc;

pub struct AppState<A: StorageAdapter> {
    pub registry: Arc<SchemaRegistry>,
    pub engine: Arc<CrudEngine<A>>,
    pub controller: Arc<Controller<A>>,
    pub api: Arc<CompiledApi>,
}

impl<A: StorageAdapter> Clone for AppState<A> {
    fn clone(&self) -> Self {
        AppState {
            registry: self.registry.clone(),
            engine: self.engine.clone(),
            controller: self.controller.clone(),
            api: self.api.clone(),
        }
    }
}

impl<A: StorageAdapter> AppState<A> {
    /// Register the schema, compile the API, connect the adapter and create storage for
    /// every class. Any failure here is fatal; nothing is served from a partial state.
    pub async fn build(
        config: &SchemaConfig,
        adapter: A,
        hooks: HookPipeline,
        resolvers: ResolverMap,
    ) -> Result<Self, AppError> {
        let registry = Arc::new(resolve(config)?);
        let engine = Arc::new(CrudEngine::new(Arc::new(adapter), registry.clone()));
        let controller = Arc::new(Controller::new(engine.clone(), Arc::new(hooks)));
        let api = Arc::new(compile(registry.clone(), controller.clone(), &resolvers)?);
        engine.initialize().await?;
        tracing::info!(
            classes = registry.classes().len(),
            operations = api.queries.len() + api.mutations.len(),
            "classbase ready"
        );
        Ok(AppState {
            registry,
            engine,
            controller,
            api,
        })
    }

    pub async fn execute(&self, operation: &str, call: OperationCall) -> Result<Value, OperationError> {
        self.api.execute(operation, call).await
    }

    pub async fn respond(&self, operation: &str, call: OperationCall) -> OperationResponse {
        self.api.respond(operation, call).await
    }

    pub async fn shutdown(&self) -> Result<(), AppError> {
        self.engine.shutdown().await?;
        tracing::info!("classbase stopped");
        Ok(())
    }
}
