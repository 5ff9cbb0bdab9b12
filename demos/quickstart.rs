//! Quickstart: compile a schema, run a few operations on the in-memory adapter.
//!
//! Run: `cargo run --example quickstart`
//! Set `SCHEMA_PATH` to load a schema JSON file instead of the built-in one.

use classbase_sdk::{
    load_from_path, load_from_str, AppState, CallContext, FnHook, FnResolver, HookEvent, HookObject, HookPipeline,
    MemoryAdapter, OperationCall, ResolverMap,
};
use serde_json::json;
use std::sync::Arc;

const SCHEMA: &str = r#"{
  "classes": [{
    "name": "Person",
    "fields": [
      { "name": "name", "type": "String", "required": true },
      { "name": "age", "type": "Int" }
    ]
  }],
  "resolvers": {
    "queries": [{ "name": "helloWorld", "type": "String", "required": true,
                  "args": [{ "name": "name", "type": "String" }] }]
  }
}"#;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("classbase_sdk=info")),
        )
        .init();

    let config = match std::env::var("SCHEMA_PATH") {
        Ok(path) => load_from_path(&path).await?,
        Err(_) => load_from_str(SCHEMA)?,
    };

    let mut hooks = HookPipeline::new();
    hooks.register(
        Some("Person"),
        HookEvent::BeforeCreate,
        Arc::new(FnHook::new("trim-name", |o: &mut HookObject| {
            if let Some(name) = o.new_data().get("name").and_then(|v| v.as_str()) {
                let trimmed = name.trim().to_string();
                o.upsert_new_data("name", json!(trimmed));
            }
            Ok(())
        })),
    );
    let resolvers = ResolverMap::new().query(
        "helloWorld",
        Arc::new(FnResolver::new(|call: OperationCall| async move {
            let name = call.arg("name").and_then(|v| v.as_str()).unwrap_or("world").to_string();
            Ok(json!(format!("Hello {}!", name)))
        })),
    );

    let state = AppState::build(&config, MemoryAdapter::new(), hooks, resolvers).await?;
    print!("{}", state.api.describe());

    let root = CallContext::root();
    for (name, age) in [("  Lucas ", 23), ("Jeanne", 23), ("Paul", 40)] {
        let call = OperationCall::new(json!({ "input": { "fields": { "name": name, "age": age } } }), root.clone());
        state.execute("createOnePerson", call).await?;
    }

    let call = OperationCall::new(json!({ "where": { "age": { "equalTo": 23 } } }), root.clone());
    let found = state.respond("findManyPerson", call).await;
    println!("{}", serde_json::to_string_pretty(&found.to_json())?);

    let call = OperationCall::new(json!({ "name": "Classbase" }), root.clone());
    println!("{}", state.execute("helloWorld", call).await?);

    let missing = OperationCall::new(json!({ "input": { "id": "not-an-id" } }), root);
    println!("{}", state.respond("deleteOnePerson", missing).await.to_json());

    state.shutdown().await?;
    Ok(())
}
