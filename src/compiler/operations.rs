//! Operation descriptors and the compiled API that executes them.

use crate::compiler::{OperationCall, Resolver, ShapeArena, ShapeField, TypeRef};
use crate::config::SchemaRegistry;
use crate::error::{AppError, OperationError};
use crate::response::OperationResponse;
use crate::service::RequestValidator;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// The eight generated operations of a class.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CrudKind {
    FindOne,
    FindMany,
    CreateOne,
    CreateMany,
    UpdateOne,
    UpdateMany,
    DeleteOne,
    DeleteMany,
}

impl CrudKind {
    pub const ALL: [CrudKind; 8] = [
        CrudKind::FindOne,
        CrudKind::FindMany,
        CrudKind::CreateOne,
        CrudKind::CreateMany,
        CrudKind::UpdateOne,
        CrudKind::UpdateMany,
        CrudKind::DeleteOne,
        CrudKind::DeleteMany,
    ];

    /// Name prefix: `findOne` + `Person` -> `findOnePerson`.
    pub fn prefix(self) -> &'static str {
        match self {
            CrudKind::FindOne => "findOne",
            CrudKind::FindMany => "findMany",
            CrudKind::CreateOne => "createOne",
            CrudKind::CreateMany => "createMany",
            CrudKind::UpdateOne => "updateOne",
            CrudKind::UpdateMany => "updateMany",
            CrudKind::DeleteOne => "deleteOne",
            CrudKind::DeleteMany => "deleteMany",
        }
    }

    pub fn operation_name(self, class: &str) -> String {
        format!("{}{}", self.prefix(), class)
    }

    pub fn is_mutation(self) -> bool {
        !matches!(self, CrudKind::FindOne | CrudKind::FindMany)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Crud(CrudKind),
    CustomQuery,
    CustomMutation,
}

impl OperationKind {
    pub fn is_mutation(self) -> bool {
        match self {
            OperationKind::Crud(kind) => kind.is_mutation(),
            OperationKind::CustomQuery => false,
            OperationKind::CustomMutation => true,
        }
    }
}

/// A compiled, ready-to-invoke query or mutation.
#[derive(Clone)]
pub struct OperationDescriptor {
    pub name: String,
    pub kind: OperationKind,
    /// Owning class; `None` for global custom resolvers.
    pub class_name: Option<String>,
    pub args: Vec<ShapeField>,
    pub output: TypeRef,
    pub description: Option<String>,
    pub(crate) handler: Arc<dyn Resolver>,
}

impl fmt::Debug for OperationDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationDescriptor")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("class_name", &self.class_name)
            .field("args", &self.args)
            .field("output", &self.output)
            .finish()
    }
}

/// Everything the compiler produced: shapes plus queries and mutations by name.
pub struct CompiledApi {
    registry: Arc<SchemaRegistry>,
    pub shapes: ShapeArena,
    pub queries: BTreeMap<String, OperationDescriptor>,
    pub mutations: BTreeMap<String, OperationDescriptor>,
}

impl CompiledApi {
    pub(crate) fn new(
        registry: Arc<SchemaRegistry>,
        shapes: ShapeArena,
        queries: BTreeMap<String, OperationDescriptor>,
        mutations: BTreeMap<String, OperationDescriptor>,
    ) -> Self {
        CompiledApi {
            registry,
            shapes,
            queries,
            mutations,
        }
    }

    pub fn operation(&self, name: &str) -> Option<&OperationDescriptor> {
        self.queries.get(name).or_else(|| self.mutations.get(name))
    }

    pub fn operation_names(&self) -> Vec<&str> {
        self.queries.keys().chain(self.mutations.keys()).map(String::as_str).collect()
    }

    /// Validate the arguments against the operation's declared shapes, then run it.
    pub async fn execute(&self, name: &str, call: OperationCall) -> Result<Value, OperationError> {
        let op = self
            .operation(name)
            .ok_or_else(|| OperationError::new(name, None, AppError::NotFound(format!("operation '{}'", name))))?;
        let result = match RequestValidator::new(&self.registry, &self.shapes).validate_args(&op.args, &call.args) {
            Ok(()) => op.handler.resolve(&call).await,
            Err(e) => Err(e),
        };
        result.map_err(|e| {
            tracing::warn!(operation = %name, error = %e, code = e.code(), "operation failed");
            OperationError::new(name, op.class_name.as_deref(), e)
        })
    }

    /// `execute` folded into the response envelope.
    pub async fn respond(&self, name: &str, call: OperationCall) -> OperationResponse {
        OperationResponse::from_result(self.execute(name, call).await)
    }

    /// Signature of every operation, one per line, for inspection and snapshotting.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        for (keyword, ops) in [("query", &self.queries), ("mutation", &self.mutations)] {
            for op in ops.values() {
                let args: Vec<String> = op
                    .args
                    .iter()
                    .map(|a| format!("{}: {}", a.name, self.shapes.render(&a.ty)))
                    .collect();
                out.push_str(&format!(
                    "{} {}({}): {}\n",
                    keyword,
                    op.name,
                    args.join(", "),
                    self.shapes.render(&op.output)
                ));
            }
        }
        out
    }
}

impl fmt::Debug for CompiledApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledApi")
            .field("queries", &self.queries.keys().collect::<Vec<_>>())
            .field("mutations", &self.mutations.keys().collect::<Vec<_>>())
            .finish()
    }
}
