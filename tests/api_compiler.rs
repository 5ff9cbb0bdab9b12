mod common;

use classbase_sdk::{
    AppState, CallContext, ConfigError, FnResolver, HookPipeline, MemoryAdapter, OperationCall, ResolverMap,
    SchemaConfig,
};
use common::root;
use serde_json::json;
use std::sync::Arc;

fn schema_with_resolvers() -> SchemaConfig {
    serde_json::from_value(json!({
        "classes": [{
            "name": "Person",
            "fields": [
                { "name": "name", "type": "String", "required": true },
                { "name": "age", "type": "Int" }
            ],
            "resolvers": {
                "mutations": [{
                    "name": "birthday",
                    "type": "Object", "class": "Person",
                    "args": [{ "name": "id", "type": "ID", "required": true }]
                }]
            }
        }],
        "resolvers": {
            "queries": [{
                "name": "helloWorld", "type": "String", "required": true,
                "args": [{ "name": "name", "type": "String", "required": true }]
            }]
        }
    }))
    .unwrap()
}

fn resolvers() -> ResolverMap {
    ResolverMap::new()
        .query(
            "helloWorld",
            Arc::new(FnResolver::new(|call: OperationCall| async move {
                let name = call.arg("name").and_then(|v| v.as_str()).unwrap_or_default().to_string();
                Ok(json!(format!("Hello {}", name)))
            })),
        )
        .mutation(
            "birthday",
            Arc::new(FnResolver::new(|call: OperationCall| async move {
                Ok(json!({ "id": call.args["input"]["id"], "name": "Lucas", "age": 24 }))
            })),
        )
}

async fn build() -> AppState<MemoryAdapter> {
    AppState::build(&schema_with_resolvers(), MemoryAdapter::new(), HookPipeline::new(), resolvers())
        .await
        .unwrap()
}

#[tokio::test]
async fn compiling_twice_yields_the_same_api() {
    let a = build().await;
    let b = build().await;
    assert_eq!(a.api.operation_names(), b.api.operation_names());
    assert_eq!(a.api.describe(), b.api.describe());
    assert_eq!(a.api.shapes.to_string(), b.api.shapes.to_string());
}

#[tokio::test]
async fn custom_resolvers_are_invoked_directly() {
    let state = build().await;
    let hello = state.execute("helloWorld", root(json!({ "name": "Jeanne" }))).await.unwrap();
    assert_eq!(hello, json!("Hello Jeanne"));

    let err = state.execute("helloWorld", root(json!({}))).await.unwrap_err();
    assert_eq!(err.code(), "validation_error");

    let birthday = state
        .execute("birthday", OperationCall::new(json!({ "input": { "id": "abc" } }), CallContext::anonymous()))
        .await
        .unwrap();
    assert_eq!(birthday["age"], json!(24));
    assert_eq!(state.api.operation("birthday").unwrap().class_name.as_deref(), Some("Person"));
}

#[tokio::test]
async fn filter_shapes_expose_typed_operators() {
    let state = build().await;
    let shapes = &state.api.shapes;
    let person = shapes.get("PersonWhereInput").unwrap();
    for key in ["id", "name", "age", "AND", "OR"] {
        assert!(person.field(key).is_some(), "{}", key);
    }
    let int = shapes.get("IntWhereInput").unwrap();
    assert!(int.field("greaterThan").is_some());
    assert!(int.field("contains").is_none());
    let string = shapes.get("StringWhereInput").unwrap();
    assert!(string.field("contains").is_some());
}

#[tokio::test]
async fn cyclic_schema_is_fatal_at_startup() {
    let config: SchemaConfig = serde_json::from_value(json!({
        "classes": [
            { "name": "A", "fields": [{ "name": "b", "type": "Object", "class": "B" }] },
            { "name": "B", "fields": [{ "name": "a", "type": "Object", "class": "A" }] }
        ]
    }))
    .unwrap();
    let err = AppState::build(&config, MemoryAdapter::new(), HookPipeline::new(), ResolverMap::new())
        .await
        .err()
        .unwrap();
    assert_eq!(err.code(), "config_error");
    assert!(matches!(err, classbase_sdk::AppError::Config(ConfigError::CyclicReference(_))));
}

#[tokio::test]
async fn user_declared_identity_fields_are_kept_and_merged() {
    let config: SchemaConfig = serde_json::from_value(json!({
        "classes": [{ "name": "User", "fields": [{ "name": "nickname", "type": "String" }] }]
    }))
    .unwrap();
    let state = AppState::build(&config, MemoryAdapter::new(), HookPipeline::new(), ResolverMap::new())
        .await
        .unwrap();
    let user = state.api.shapes.get("User").unwrap();
    for field in ["nickname", "authentication", "provider", "email"] {
        assert!(user.field(field).is_some(), "{}", field);
    }
    assert_eq!(user.fields.iter().filter(|f| f.name == "email").count(), 1);
}
