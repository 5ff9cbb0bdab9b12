//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use classbase_sdk::compiler::OperationCall;
use classbase_sdk::store::{MemoryDialect, MemoryQuery, NativeRow};
use classbase_sdk::{
    AppState, CallContext, HookPipeline, MemoryAdapter, Page, ResolverMap, SchemaConfig, StorageAdapter, StoreError,
};
use serde_json::{json, Map, Value};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

pub fn person_schema() -> SchemaConfig {
    serde_json::from_value(json!({
        "classes": [{
            "name": "Person",
            "fields": [
                { "name": "name", "type": "String", "required": true },
                { "name": "age", "type": "Int" },
                { "name": "address", "type": "Object", "object": {
                    "name": "Address", "fields": [{ "name": "city", "type": "String" }]
                }}
            ]
        }]
    }))
    .unwrap()
}

pub async fn state(hooks: HookPipeline) -> AppState<MemoryAdapter> {
    AppState::build(&person_schema(), MemoryAdapter::new(), hooks, ResolverMap::new())
        .await
        .unwrap()
}

pub fn root(args: Value) -> OperationCall {
    OperationCall::new(args, CallContext::root())
}

pub fn fields(v: Value) -> Map<String, Value> {
    v.as_object().cloned().unwrap()
}

pub async fn create_person(state: &AppState<impl StorageAdapter>, name: &str, age: i64) -> Value {
    state
        .execute(
            "createOnePerson",
            root(json!({ "input": { "fields": { "name": name, "age": age } } })),
        )
        .await
        .unwrap()
}

pub fn names(objects: &Value) -> Vec<String> {
    let mut out: Vec<String> = objects
        .as_array()
        .map(|a| a.iter().filter_map(|o| o["name"].as_str().map(str::to_string)).collect())
        .unwrap_or_default();
    out.sort();
    out
}

/// In-memory adapter that records every write into a shared log.
pub struct RecordingAdapter {
    inner: MemoryAdapter,
    pub log: Arc<Mutex<Vec<String>>>,
}

impl RecordingAdapter {
    pub fn new(log: Arc<Mutex<Vec<String>>>) -> Self {
        RecordingAdapter {
            inner: MemoryAdapter::new(),
            log,
        }
    }

    fn record(&self, entry: &str) {
        self.log.lock().unwrap().push(entry.to_string());
    }
}

#[async_trait]
impl StorageAdapter for RecordingAdapter {
    type Dialect = MemoryDialect;

    fn dialect(&self) -> &MemoryDialect {
        self.inner.dialect()
    }

    async fn connect(&self) -> Result<(), StoreError> {
        self.inner.connect().await
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.inner.close().await
    }

    async fn ensure_class(&self, class: &str) -> Result<(), StoreError> {
        self.inner.ensure_class(class).await
    }

    async fn get_object(&self, class: &str, id: &Uuid, fields: &[String]) -> Result<Option<NativeRow>, StoreError> {
        self.inner.get_object(class, id, fields).await
    }

    async fn get_objects(
        &self,
        class: &str,
        query: &MemoryQuery,
        fields: &[String],
        page: Page,
    ) -> Result<Vec<NativeRow>, StoreError> {
        self.inner.get_objects(class, query, fields, page).await
    }

    async fn create_object(&self, class: &str, data: &Map<String, Value>) -> Result<String, StoreError> {
        self.record("create");
        self.inner.create_object(class, data).await
    }

    async fn create_objects(&self, class: &str, data: &[Map<String, Value>]) -> Result<Vec<String>, StoreError> {
        self.record("create");
        self.inner.create_objects(class, data).await
    }

    async fn update_object(&self, class: &str, id: &Uuid, data: &Map<String, Value>) -> Result<u64, StoreError> {
        self.record("update");
        self.inner.update_object(class, id, data).await
    }

    async fn update_objects(&self, class: &str, query: &MemoryQuery, data: &Map<String, Value>) -> Result<u64, StoreError> {
        self.record("update");
        self.inner.update_objects(class, query, data).await
    }

    async fn delete_object(&self, class: &str, id: &Uuid) -> Result<u64, StoreError> {
        self.record("delete");
        self.inner.delete_object(class, id).await
    }

    async fn delete_objects(&self, class: &str, query: &MemoryQuery) -> Result<u64, StoreError> {
        self.record("delete");
        self.inner.delete_objects(class, query).await
    }
}
