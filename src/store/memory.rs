//! In-process adapter. Documents live in insertion order per class; queries are evaluated as trees.

use crate::error::StoreError;
use crate::filter::{Predicate, QueryDialect};
use crate::service::value_eq;
use crate::store::{NativeRow, Page, StorageAdapter};
use async_trait::async_trait;
use chrono::DateTime;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use tokio::sync::RwLock;
use uuid::Uuid;

static NULL: Value = Value::Null;

/// Query tree understood by [`MemoryAdapter`].
#[derive(Clone, Debug, PartialEq)]
pub enum MemoryQuery {
    All,
    Nothing,
    Id(Predicate<Uuid>),
    Field { path: Vec<String>, predicate: Predicate<Value> },
    And(Vec<MemoryQuery>),
    Or(Vec<MemoryQuery>),
}

impl MemoryQuery {
    pub fn matches(&self, id: &Uuid, doc: &Map<String, Value>) -> bool {
        match self {
            MemoryQuery::All => true,
            MemoryQuery::Nothing => false,
            MemoryQuery::Id(p) => eval_id(p, id),
            MemoryQuery::Field { path, predicate } => eval(predicate, lookup(doc, path)),
            MemoryQuery::And(parts) => parts.iter().all(|q| q.matches(id, doc)),
            MemoryQuery::Or(parts) => parts.iter().any(|q| q.matches(id, doc)),
        }
    }
}

fn lookup<'a>(doc: &'a Map<String, Value>, path: &[String]) -> &'a Value {
    let Some((head, rest)) = path.split_first() else {
        return &NULL;
    };
    let mut current = doc.get(head).unwrap_or(&NULL);
    for segment in rest {
        current = current.get(segment).unwrap_or(&NULL);
    }
    current
}

fn eval_id(p: &Predicate<Uuid>, id: &Uuid) -> bool {
    match p {
        Predicate::Eq(v) => id == v,
        Predicate::Ne(v) => id != v,
        Predicate::Gt(v) => id > v,
        Predicate::Gte(v) => id >= v,
        Predicate::Lt(v) => id < v,
        Predicate::Lte(v) => id <= v,
        Predicate::In(vs) => vs.contains(id),
        Predicate::NotIn(vs) => !vs.contains(id),
        Predicate::Substring(s) => id.to_string().contains(s.as_str()),
        Predicate::NotSubstring(s) => !id.to_string().contains(s.as_str()),
        Predicate::HasElement(_) => false,
        Predicate::LacksElement(_) => true,
    }
}

/// Negative predicates are the complement of their positive form, so missing values satisfy them.
fn eval(p: &Predicate<Value>, actual: &Value) -> bool {
    match p {
        Predicate::Eq(v) => value_eq(actual, v),
        Predicate::Ne(v) => !value_eq(actual, v),
        Predicate::Gt(v) => compare(actual, v) == Some(Ordering::Greater),
        Predicate::Gte(v) => matches!(compare(actual, v), Some(Ordering::Greater | Ordering::Equal)),
        Predicate::Lt(v) => compare(actual, v) == Some(Ordering::Less),
        Predicate::Lte(v) => matches!(compare(actual, v), Some(Ordering::Less | Ordering::Equal)),
        Predicate::In(vs) => !actual.is_null() && vs.iter().any(|v| value_eq(actual, v)),
        Predicate::NotIn(vs) => !eval(&Predicate::In(vs.clone()), actual),
        Predicate::Substring(s) => actual.as_str().map(|a| a.contains(s.as_str())).unwrap_or(false),
        Predicate::NotSubstring(s) => !eval(&Predicate::Substring(s.clone()), actual),
        Predicate::HasElement(v) => actual
            .as_array()
            .map(|items| items.iter().any(|i| value_eq(i, v)))
            .unwrap_or(false),
        Predicate::LacksElement(v) => !eval(&Predicate::HasElement(v.clone()), actual),
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => match (DateTime::parse_from_rfc3339(x), DateTime::parse_from_rfc3339(y)) {
            (Ok(x), Ok(y)) => Some(x.cmp(&y)),
            _ => Some(x.cmp(y)),
        },
        _ => None,
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct MemoryDialect;

impl QueryDialect for MemoryDialect {
    type Query = MemoryQuery;
    type Id = Uuid;

    fn parse_id(&self, raw: &str) -> Option<Uuid> {
        Uuid::parse_str(raw).ok()
    }

    fn id_predicate(&self, predicate: Predicate<Uuid>) -> MemoryQuery {
        MemoryQuery::Id(predicate)
    }

    fn field_predicate(&self, path: &[String], predicate: Predicate<Value>) -> MemoryQuery {
        MemoryQuery::Field {
            path: path.to_vec(),
            predicate,
        }
    }

    fn all_of(&self, parts: Vec<MemoryQuery>) -> MemoryQuery {
        MemoryQuery::And(parts)
    }

    fn any_of(&self, parts: Vec<MemoryQuery>) -> MemoryQuery {
        MemoryQuery::Or(parts)
    }

    fn match_all(&self) -> MemoryQuery {
        MemoryQuery::All
    }

    fn match_none(&self) -> MemoryQuery {
        MemoryQuery::Nothing
    }
}

type Table = Vec<(Uuid, Map<String, Value>)>;

/// Adapter keeping every class in memory. Starts disconnected; every call fails with
/// `Unavailable` until [`StorageAdapter::connect`] succeeds.
#[derive(Debug, Default)]
pub struct MemoryAdapter {
    tables: RwLock<HashMap<String, Table>>,
    connected: AtomicBool,
    dialect: MemoryDialect,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_connected(&self) -> Result<(), StoreError> {
        if self.connected.load(AtomicOrdering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("memory adapter is not connected".into()))
        }
    }

    fn missing(class: &str) -> StoreError {
        StoreError::Query(format!("class {} has no table", class))
    }
}

fn project(id: &Uuid, doc: &Map<String, Value>, fields: &[String]) -> NativeRow {
    let fields = if fields.is_empty() {
        doc.clone()
    } else {
        fields
            .iter()
            .filter_map(|f| doc.get(f).map(|v| (f.clone(), v.clone())))
            .collect()
    };
    NativeRow {
        id: id.to_string(),
        fields,
    }
}

fn merge(doc: &mut Map<String, Value>, data: &Map<String, Value>) {
    for (k, v) in data {
        doc.insert(k.clone(), v.clone());
    }
}

#[async_trait]
impl StorageAdapter for MemoryAdapter {
    type Dialect = MemoryDialect;

    fn dialect(&self) -> &MemoryDialect {
        &self.dialect
    }

    async fn connect(&self) -> Result<(), StoreError> {
        self.connected.store(true, AtomicOrdering::SeqCst);
        tracing::debug!("memory adapter connected");
        Ok(())
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.connected.store(false, AtomicOrdering::SeqCst);
        Ok(())
    }

    async fn ensure_class(&self, class: &str) -> Result<(), StoreError> {
        self.check_connected()?;
        self.tables.write().await.entry(class.to_string()).or_default();
        Ok(())
    }

    async fn get_object(&self, class: &str, id: &Uuid, fields: &[String]) -> Result<Option<NativeRow>, StoreError> {
        self.check_connected()?;
        let tables = self.tables.read().await;
        let table = tables.get(class).ok_or_else(|| Self::missing(class))?;
        Ok(table.iter().find(|(k, _)| k == id).map(|(k, doc)| project(k, doc, fields)))
    }

    async fn get_objects(
        &self,
        class: &str,
        query: &MemoryQuery,
        fields: &[String],
        page: Page,
    ) -> Result<Vec<NativeRow>, StoreError> {
        self.check_connected()?;
        let tables = self.tables.read().await;
        let table = tables.get(class).ok_or_else(|| Self::missing(class))?;
        Ok(page.apply(
            table
                .iter()
                .filter(|(id, doc)| query.matches(id, doc))
                .map(|(id, doc)| project(id, doc, fields)),
        ))
    }

    async fn create_object(&self, class: &str, data: &Map<String, Value>) -> Result<String, StoreError> {
        let mut ids = self.create_objects(class, std::slice::from_ref(data)).await?;
        ids.pop().ok_or_else(|| StoreError::Query("insert returned no identifier".into()))
    }

    async fn create_objects(&self, class: &str, data: &[Map<String, Value>]) -> Result<Vec<String>, StoreError> {
        self.check_connected()?;
        let mut tables = self.tables.write().await;
        let table = tables.get_mut(class).ok_or_else(|| Self::missing(class))?;
        let mut ids = Vec::with_capacity(data.len());
        for doc in data {
            let id = Uuid::now_v7();
            table.push((id, doc.clone()));
            ids.push(id.to_string());
        }
        Ok(ids)
    }

    async fn update_object(&self, class: &str, id: &Uuid, data: &Map<String, Value>) -> Result<u64, StoreError> {
        self.update_objects(class, &MemoryQuery::Id(Predicate::Eq(*id)), data).await
    }

    async fn update_objects(&self, class: &str, query: &MemoryQuery, data: &Map<String, Value>) -> Result<u64, StoreError> {
        self.check_connected()?;
        let mut tables = self.tables.write().await;
        let table = tables.get_mut(class).ok_or_else(|| Self::missing(class))?;
        let mut changed = 0;
        for (id, doc) in table.iter_mut() {
            if query.matches(id, doc) {
                merge(doc, data);
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn delete_object(&self, class: &str, id: &Uuid) -> Result<u64, StoreError> {
        self.delete_objects(class, &MemoryQuery::Id(Predicate::Eq(*id))).await
    }

    async fn delete_objects(&self, class: &str, query: &MemoryQuery) -> Result<u64, StoreError> {
        self.check_connected()?;
        let mut tables = self.tables.write().await;
        let table = tables.get_mut(class).ok_or_else(|| Self::missing(class))?;
        let before = table.len();
        table.retain(|(id, doc)| !query.matches(id, doc));
        Ok((before - table.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    async fn adapter() -> MemoryAdapter {
        let a = MemoryAdapter::new();
        a.connect().await.unwrap();
        a.ensure_class("Person").await.unwrap();
        a
    }

    fn field(name: &str, p: Predicate<Value>) -> MemoryQuery {
        MemoryDialect.field_predicate(&[name.to_string()], p)
    }

    #[tokio::test]
    async fn disconnected_adapter_is_unavailable() {
        let a = MemoryAdapter::new();
        let err = a.ensure_class("Person").await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
        let a = adapter().await;
        a.close().await.unwrap();
        assert!(matches!(
            a.get_objects("Person", &MemoryQuery::All, &[], Page::all()).await,
            Err(StoreError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn create_then_get_returns_native_id() {
        let a = adapter().await;
        let id = a.create_object("Person", &doc(json!({ "name": "Lucas" }))).await.unwrap();
        let uuid = MemoryDialect.parse_id(&id).unwrap();
        let row = a.get_object("Person", &uuid, &[]).await.unwrap().unwrap();
        assert_eq!(row.id, id);
        assert_eq!(row.fields["name"], json!("Lucas"));
    }

    #[tokio::test]
    async fn queries_filter_and_keep_insertion_order() {
        let a = adapter().await;
        let people = [json!({ "name": "Lucas", "age": 23 }), json!({ "name": "Jeanne", "age": 23 }), json!({ "name": "Tata", "age": 40 })];
        let docs: Vec<_> = people.into_iter().map(doc).collect();
        a.create_objects("Person", &docs).await.unwrap();

        let rows = a
            .get_objects("Person", &field("age", Predicate::Eq(json!(23.0))), &["name".into()], Page::all())
            .await
            .unwrap();
        let names: Vec<_> = rows.iter().map(|r| r.fields["name"].clone()).collect();
        assert_eq!(names, vec![json!("Lucas"), json!("Jeanne")]);
        assert!(rows[0].fields.get("age").is_none());

        let rows = a
            .get_objects("Person", &MemoryQuery::All, &[], Page::new(1, 1))
            .await
            .unwrap();
        assert_eq!(rows[0].fields["name"], json!("Jeanne"));
    }

    #[tokio::test]
    async fn update_merges_top_level_fields() {
        let a = adapter().await;
        let ids = a
            .create_objects("Person", &[doc(json!({ "name": "A", "age": 1 })), doc(json!({ "name": "B", "age": 1 }))])
            .await
            .unwrap();
        let changed = a
            .update_objects("Person", &field("age", Predicate::Eq(json!(1))), &doc(json!({ "age": 2 })))
            .await
            .unwrap();
        assert_eq!(changed, 2);
        let row = a
            .get_object("Person", &MemoryDialect.parse_id(&ids[0]).unwrap(), &[])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.fields["name"], json!("A"));
        assert_eq!(row.fields["age"], json!(2));
    }

    #[tokio::test]
    async fn delete_reports_count() {
        let a = adapter().await;
        let id = a.create_object("Person", &doc(json!({ "name": "A" }))).await.unwrap();
        let uuid = MemoryDialect.parse_id(&id).unwrap();
        assert_eq!(a.delete_object("Person", &uuid).await.unwrap(), 1);
        assert_eq!(a.delete_object("Person", &uuid).await.unwrap(), 0);
    }

    #[test]
    fn negative_predicates_complement_positive_ones() {
        let d = doc(json!({ "tags": ["a"], "name": "Lucas" }));
        let id = Uuid::now_v7();
        assert!(field("missing", Predicate::NotIn(vec![json!(1)])).matches(&id, &d));
        assert!(!field("missing", Predicate::In(vec![json!(1)])).matches(&id, &d));
        assert!(field("tags", Predicate::HasElement(json!("a"))).matches(&id, &d));
        assert!(field("tags", Predicate::LacksElement(json!("b"))).matches(&id, &d));
        assert!(field("name", Predicate::Substring("uc".into())).matches(&id, &d));
        assert!(field("name", Predicate::Ne(Value::Null)).matches(&id, &d));
        assert!(field("missing", Predicate::Eq(Value::Null)).matches(&id, &d));
    }

    #[test]
    fn nested_paths_are_followed() {
        let d = doc(json!({ "address": { "city": "Paris" } }));
        let q = MemoryDialect.field_predicate(&["address".into(), "city".into()], Predicate::Eq(json!("Paris")));
        assert!(q.matches(&Uuid::now_v7(), &d));
    }

    #[test]
    fn dates_compare_as_instants_across_offsets() {
        let d = doc(json!({ "at": "2024-01-01T10:00:00+02:00" }));
        let id = Uuid::now_v7();
        // 08:00Z is earlier than 09:00Z even though the raw strings sort the other way.
        assert!(field("at", Predicate::Lt(json!("2024-01-01T09:00:00Z"))).matches(&id, &d));
        assert!(!field("at", Predicate::Gt(json!("2024-01-01T09:00:00Z"))).matches(&id, &d));
        assert!(field("at", Predicate::Gte(json!("2024-01-01T08:00:00Z"))).matches(&id, &d));
        assert!(field("at", Predicate::Lte(json!("2024-01-01T08:00:00Z"))).matches(&id, &d));
    }

    #[test]
    fn plain_strings_still_compare_lexically() {
        let d = doc(json!({ "name": "Lucas" }));
        assert!(field("name", Predicate::Gt(json!("Jeanne"))).matches(&Uuid::now_v7(), &d));
    }

    #[tokio::test]
    async fn underscore_id_is_an_ordinary_document_field() {
        let a = adapter().await;
        let id = a.create_object("Person", &doc(json!({ "_id": "legacy-42", "name": "Lucas" }))).await.unwrap();
        let uuid = MemoryDialect.parse_id(&id).unwrap();
        let row = a.get_object("Person", &uuid, &[]).await.unwrap().unwrap();
        assert_eq!(row.id, id);
        assert_eq!(row.fields["_id"], json!("legacy-42"));

        let rows = a
            .get_objects("Person", &field("_id", Predicate::Eq(json!("legacy-42"))), &["_id".into()], Page::all())
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].fields["_id"], json!("legacy-42"));
    }
}
