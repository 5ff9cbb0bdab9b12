//! CRUD-backed resolvers: argument parsing in front of the controller.

use crate::compiler::{CrudKind, OperationCall, Resolver};
use crate::error::AppError;
use crate::filter::FilterExpression;
use crate::service::{Controller, StoredObject};
use crate::store::{Page, StorageAdapter};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

pub(crate) struct CrudResolver<A: StorageAdapter> {
    kind: CrudKind,
    class: String,
    controller: Arc<Controller<A>>,
}

impl<A: StorageAdapter> CrudResolver<A> {
    pub fn new(kind: CrudKind, class: &str, controller: Arc<Controller<A>>) -> Self {
        CrudResolver {
            kind,
            class: class.to_string(),
            controller,
        }
    }
}

#[async_trait]
impl<A: StorageAdapter> Resolver for CrudResolver<A> {
    async fn resolve(&self, call: &OperationCall) -> Result<Value, AppError> {
        let class = self.class.as_str();
        let fields = call.fields.as_slice();
        let ctx = &call.context;
        let c = &self.controller;
        match self.kind {
            CrudKind::FindOne => {
                let id = string_arg(&call.args, "id")?;
                Ok(c.find_one(class, id, fields, ctx).await?.map_or(Value::Null, |o| o.to_value()))
            }
            CrudKind::FindMany => {
                let filter = where_arg(&call.args)?;
                let page = page_arg(&call.args)?;
                Ok(many(c.find_many(class, filter.as_ref(), fields, page, ctx).await?))
            }
            CrudKind::CreateOne => {
                let input = input_arg(call)?;
                let data = object_arg(input, "fields")?;
                Ok(c.create_one(class, data, fields, ctx).await?.to_value())
            }
            CrudKind::CreateMany => {
                let input = input_arg(call)?;
                let items = match input.get("fields") {
                    Some(Value::Array(items)) => items
                        .iter()
                        .map(|v| {
                            v.as_object()
                                .cloned()
                                .ok_or_else(|| AppError::Validation("input.fields items must be objects".into()))
                        })
                        .collect::<Result<Vec<_>, _>>()?,
                    _ => return Err(AppError::Validation("input.fields must be a list".into())),
                };
                let page = page_arg(input)?;
                Ok(many(c.create_many(class, items, fields, page, ctx).await?))
            }
            CrudKind::UpdateOne => {
                let input = input_arg(call)?;
                let id = string_arg(input, "id")?;
                let data = object_arg(input, "fields")?;
                Ok(c.update_one(class, id, data, fields, ctx).await?.to_value())
            }
            CrudKind::UpdateMany => {
                let input = input_arg(call)?;
                let data = object_arg(input, "fields")?;
                let filter = where_arg(input)?;
                let page = page_arg(input)?;
                Ok(many(c.update_many(class, filter.as_ref(), data, fields, page, ctx).await?))
            }
            CrudKind::DeleteOne => {
                let input = input_arg(call)?;
                let id = string_arg(input, "id")?;
                Ok(c.delete_one(class, id, ctx).await?.to_value())
            }
            CrudKind::DeleteMany => {
                let input = input_arg(call)?;
                let filter = where_arg(input)?;
                Ok(many(c.delete_many(class, filter.as_ref(), ctx).await?))
            }
        }
    }
}

fn many(objects: Vec<StoredObject>) -> Value {
    Value::Array(objects.iter().map(StoredObject::to_value).collect())
}

fn input_arg(call: &OperationCall) -> Result<&Value, AppError> {
    call.arg("input")
        .filter(|v| v.is_object())
        .ok_or_else(|| AppError::Validation("input is required".into()))
}

fn string_arg<'v>(args: &'v Value, name: &str) -> Result<&'v str, AppError> {
    args.get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::Validation(format!("{} is required", name)))
}

fn object_arg(args: &Value, name: &str) -> Result<Map<String, Value>, AppError> {
    args.get(name)
        .and_then(Value::as_object)
        .cloned()
        .ok_or_else(|| AppError::Validation(format!("{} must be an object", name)))
}

fn where_arg(args: &Value) -> Result<Option<FilterExpression>, AppError> {
    match args.get("where") {
        Some(w) => FilterExpression::from_where(w),
        None => Ok(None),
    }
}

fn page_arg(args: &Value) -> Result<Page, AppError> {
    Ok(Page::new(count_arg(args, "offset")?, count_arg(args, "limit")?))
}

fn count_arg(args: &Value, name: &str) -> Result<usize, AppError> {
    match args.get(name) {
        None | Some(Value::Null) => Ok(0),
        Some(v) => v
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| AppError::Validation(format!("{} must be a non-negative integer", name))),
    }
}
