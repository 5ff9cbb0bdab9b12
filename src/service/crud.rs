//! CRUD engine: executes generated operations against one storage adapter.

use crate::config::{ClassDefinition, SchemaRegistry, RESERVED_ID_FIELD};
use crate::error::AppError;
use crate::filter::{compile_filter, FilterExpression, QueryDialect};
use crate::store::{NativeId, NativeQuery, NativeRow, Page, StorageAdapter};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;

/// A normalized stored document: its fields plus the backend identifier as an opaque string.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StoredObject {
    pub id: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl StoredObject {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// JSON object with `id` first.
    pub fn to_value(&self) -> Value {
        let mut map = Map::with_capacity(self.fields.len() + 1);
        map.insert(RESERVED_ID_FIELD.to_string(), Value::String(self.id.clone()));
        for (k, v) in &self.fields {
            map.insert(k.clone(), v.clone());
        }
        Value::Object(map)
    }
}

impl From<NativeRow> for StoredObject {
    fn from(row: NativeRow) -> Self {
        StoredObject {
            id: row.id,
            fields: row.fields,
        }
    }
}

pub struct CrudEngine<A: StorageAdapter> {
    adapter: Arc<A>,
    registry: Arc<SchemaRegistry>,
}

impl<A: StorageAdapter> CrudEngine<A> {
    pub fn new(adapter: Arc<A>, registry: Arc<SchemaRegistry>) -> Self {
        CrudEngine { adapter, registry }
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    /// Connect the adapter and create storage for every registered class.
    pub async fn initialize(&self) -> Result<(), AppError> {
        self.adapter
            .connect()
            .await
            .map_err(|e| AppError::storage("connect", "", e))?;
        for class in self.registry.classes() {
            self.adapter
                .ensure_class(&class.name)
                .await
                .map_err(|e| AppError::storage("ensureClass", &class.name, e))?;
        }
        tracing::info!(classes = self.registry.classes().len(), "storage initialized");
        Ok(())
    }

    pub async fn shutdown(&self) -> Result<(), AppError> {
        self.adapter.close().await.map_err(|e| AppError::storage("close", "", e))
    }

    /// Fetch by identifier. An absent object, or an identifier the backend cannot parse, is `None`.
    pub async fn find_one(&self, class: &str, id: &str, fields: &[String]) -> Result<Option<StoredObject>, AppError> {
        let def = self.class(class, fields)?;
        let Some(native) = self.parse_id(id) else {
            return Ok(None);
        };
        let row = self
            .adapter
            .get_object(&def.name, &native, fields)
            .await
            .map_err(|e| AppError::storage("findOne", class, e))?;
        Ok(row.map(StoredObject::from))
    }

    /// List matching objects. `page.limit == 0` is unbounded.
    pub async fn find_many(
        &self,
        class: &str,
        filter: Option<&FilterExpression>,
        fields: &[String],
        page: Page,
    ) -> Result<Vec<StoredObject>, AppError> {
        let def = self.class(class, fields)?;
        let query = self.compile(def, filter)?;
        self.fetch(def, &query, fields, page, "findMany").await
    }

    /// Insert, then re-fetch by the new identifier.
    pub async fn create_one(
        &self,
        class: &str,
        data: Map<String, Value>,
        fields: &[String],
    ) -> Result<StoredObject, AppError> {
        let def = self.class(class, fields)?;
        let id = self
            .adapter
            .create_object(&def.name, &data)
            .await
            .map_err(|e| AppError::storage("createOne", class, e))?;
        tracing::debug!(class = %class, id = %id, "created");
        self.find_one(class, &id, fields)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("{} {} vanished after create", class, id)))
    }

    /// Insert all, then re-fetch every new identifier with one disjunctive filter.
    /// Results follow input order; `page` windows the re-fetch.
    pub async fn create_many(
        &self,
        class: &str,
        data: Vec<Map<String, Value>>,
        fields: &[String],
        page: Page,
    ) -> Result<Vec<StoredObject>, AppError> {
        let def = self.class(class, fields)?;
        if data.is_empty() {
            return Ok(Vec::new());
        }
        let ids = self
            .adapter
            .create_objects(&def.name, &data)
            .await
            .map_err(|e| AppError::storage("createMany", class, e))?;
        tracing::debug!(class = %class, count = ids.len(), "created");
        self.refetch(def, &ids, fields, page, "createMany").await
    }

    /// Snapshot the target, update it, re-fetch it. Zero targets is `NotFound`.
    pub async fn update_one(
        &self,
        class: &str,
        id: &str,
        data: Map<String, Value>,
        fields: &[String],
    ) -> Result<StoredObject, AppError> {
        let def = self.class(class, fields)?;
        let not_found = || AppError::NotFound(format!("{} {}", class, id));
        let snapshot = self
            .find_many(class, Some(&FilterExpression::field(RESERVED_ID_FIELD).equal_to(id)), &id_only(), Page::all())
            .await?;
        let target = snapshot.first().ok_or_else(not_found)?;
        let native = self.parse_id(&target.id).ok_or_else(not_found)?;
        let changed = self
            .adapter
            .update_object(&def.name, &native, &data)
            .await
            .map_err(|e| AppError::storage("updateOne", class, e))?;
        if changed == 0 {
            return Err(not_found());
        }
        self.find_one(class, &target.id, fields).await?.ok_or_else(not_found)
    }

    /// Snapshot the identifiers matching `filter` (windowed by `page`), update exactly that set,
    /// then re-fetch that set. Objects matched by the snapshot are returned even if the update
    /// made them stop matching `filter`.
    pub async fn update_many(
        &self,
        class: &str,
        filter: Option<&FilterExpression>,
        data: Map<String, Value>,
        fields: &[String],
        page: Page,
    ) -> Result<Vec<StoredObject>, AppError> {
        let def = self.class(class, fields)?;
        let snapshot = self.find_many(class, filter, &id_only(), page).await?;
        if snapshot.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<String> = snapshot.into_iter().map(|o| o.id).collect();
        let targets = self.compile(def, Some(&FilterExpression::id_in_any(ids.iter().map(String::as_str))))?;
        let changed = self
            .adapter
            .update_objects(&def.name, &targets, &data)
            .await
            .map_err(|e| AppError::storage("updateMany", class, e))?;
        tracing::debug!(class = %class, snapshot = ids.len(), changed, "updated");
        self.refetch(def, &ids, fields, Page::all(), "updateMany").await
    }

    /// Delete by identifier. Zero deleted is `NotFound`.
    pub async fn delete_one(&self, class: &str, id: &str) -> Result<(), AppError> {
        let def = self.class(class, &[])?;
        let not_found = || AppError::NotFound(format!("{} {}", class, id));
        let native = self.parse_id(id).ok_or_else(not_found)?;
        let deleted = self
            .adapter
            .delete_object(&def.name, &native)
            .await
            .map_err(|e| AppError::storage("deleteOne", class, e))?;
        if deleted == 0 {
            return Err(not_found());
        }
        Ok(())
    }

    /// Delete every object matching `filter`; returns the number deleted.
    pub async fn delete_many(&self, class: &str, filter: Option<&FilterExpression>) -> Result<u64, AppError> {
        let def = self.class(class, &[])?;
        let query = self.compile(def, filter)?;
        self.adapter
            .delete_objects(&def.name, &query)
            .await
            .map_err(|e| AppError::storage("deleteMany", class, e))
    }

    /// Resolve the class and check the projection against its fields.
    fn class(&self, class: &str, fields: &[String]) -> Result<&ClassDefinition, AppError> {
        let def = self.registry.resolve(class)?;
        let object = self.registry.class_object(def);
        if let Some(unknown) = fields
            .iter()
            .find(|f| f.as_str() != RESERVED_ID_FIELD && object.field(f).is_none())
        {
            return Err(AppError::Validation(format!("{} has no field '{}'", class, unknown)));
        }
        Ok(def)
    }

    fn compile(&self, def: &ClassDefinition, filter: Option<&FilterExpression>) -> Result<NativeQuery<A>, AppError> {
        compile_filter(self.adapter.dialect(), &self.registry, def, filter)
    }

    fn parse_id(&self, id: &str) -> Option<NativeId<A>> {
        self.adapter.dialect().parse_id(id)
    }

    async fn fetch(
        &self,
        def: &ClassDefinition,
        query: &NativeQuery<A>,
        fields: &[String],
        page: Page,
        operation: &'static str,
    ) -> Result<Vec<StoredObject>, AppError> {
        let rows = self
            .adapter
            .get_objects(&def.name, query, fields, page)
            .await
            .map_err(|e| AppError::storage(operation, &def.name, e))?;
        Ok(rows.into_iter().map(StoredObject::from).collect())
    }

    /// Fetch `ids` as one OR of per-id equality and return them in the order of `ids`.
    async fn refetch(
        &self,
        def: &ClassDefinition,
        ids: &[String],
        fields: &[String],
        page: Page,
        operation: &'static str,
    ) -> Result<Vec<StoredObject>, AppError> {
        let query = self.compile(def, Some(&FilterExpression::id_in_any(ids.iter().map(String::as_str))))?;
        let mut objects = self.fetch(def, &query, fields, page, operation).await?;
        objects.sort_by_key(|o| ids.iter().position(|id| *id == o.id).unwrap_or(usize::MAX));
        Ok(objects)
    }
}

fn id_only() -> Vec<String> {
    vec![RESERVED_ID_FIELD.to_string()]
}
