//! Resolver trait and the user-supplied implementations bound to custom operations.

use crate::error::AppError;
use crate::service::CallContext;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// One invocation of an operation.
#[derive(Clone, Debug, Default)]
pub struct OperationCall {
    /// Result of the enclosing field, for nested resolution by a serving layer.
    pub parent: Option<Value>,
    pub args: Value,
    /// Requested projection; empty means every field.
    pub fields: Vec<String>,
    pub context: CallContext,
}

impl OperationCall {
    pub fn new(args: Value, context: CallContext) -> Self {
        OperationCall {
            parent: None,
            args,
            fields: Vec::new(),
            context,
        }
    }

    pub fn with_fields(mut self, fields: &[&str]) -> Self {
        self.fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn arg(&self, name: &str) -> Option<&Value> {
        self.args.get(name).filter(|v| !v.is_null())
    }
}

#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, call: &OperationCall) -> Result<Value, AppError>;
}

type BoxFuture = Pin<Box<dyn Future<Output = Result<Value, AppError>> + Send>>;

/// Resolver from an async closure taking an owned call.
pub struct FnResolver {
    f: Box<dyn Fn(OperationCall) -> BoxFuture + Send + Sync>,
}

impl FnResolver {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(OperationCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, AppError>> + Send + 'static,
    {
        FnResolver {
            f: Box::new(move |call| Box::pin(f(call))),
        }
    }
}

#[async_trait]
impl Resolver for FnResolver {
    async fn resolve(&self, call: &OperationCall) -> Result<Value, AppError> {
        (self.f)(call.clone()).await
    }
}

/// Implementations for declared custom queries and mutations, by name.
#[derive(Clone, Default)]
pub struct ResolverMap {
    pub(crate) queries: BTreeMap<String, Arc<dyn Resolver>>,
    pub(crate) mutations: BTreeMap<String, Arc<dyn Resolver>>,
}

impl ResolverMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query(mut self, name: &str, resolver: Arc<dyn Resolver>) -> Self {
        self.queries.insert(name.to_string(), resolver);
        self
    }

    pub fn mutation(mut self, name: &str, resolver: Arc<dyn Resolver>) -> Self {
        self.mutations.insert(name.to_string(), resolver);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn fn_resolver_receives_arguments() {
        let r = FnResolver::new(|call: OperationCall| async move {
            let a = call.arg("a").and_then(Value::as_i64).unwrap_or(0);
            let b = call.arg("b").and_then(Value::as_i64).unwrap_or(0);
            Ok(json!(a + b))
        });
        let call = OperationCall::new(json!({ "a": 2, "b": 3, "c": null }), CallContext::root());
        assert_eq!(r.resolve(&call).await.unwrap(), json!(5));
        assert!(call.arg("c").is_none());
    }
}
