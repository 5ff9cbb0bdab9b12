//! PostgreSQL adapter. One table per class in a schema named from `CLASSBASE_SCHEMA`
//! (default `classbase`); documents are stored as JSONB and identifiers are UUIDv7.

use crate::error::StoreError;
use crate::filter::{Predicate, QueryDialect};
use crate::sql::{
    create_schema, create_table, delete_where, field_condition, id_condition, insert, select_where, update_where,
    QueryBuf, SqlCondition, ID_ALIAS,
};
use crate::store::{NativeRow, Page, StorageAdapter};
use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{ConnectOptions, PgPool, Row};
use std::str::FromStr;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Schema holding the class tables. From env `CLASSBASE_SCHEMA`, default `classbase`.
pub fn classbase_schema() -> String {
    std::env::var("CLASSBASE_SCHEMA").unwrap_or_else(|_| "classbase".into())
}

#[derive(Clone, Copy, Debug, Default)]
pub struct PostgresDialect;

impl QueryDialect for PostgresDialect {
    type Query = SqlCondition;
    type Id = Uuid;

    fn parse_id(&self, raw: &str) -> Option<Uuid> {
        Uuid::parse_str(raw).ok()
    }

    fn id_predicate(&self, predicate: Predicate<Uuid>) -> SqlCondition {
        id_condition(predicate)
    }

    fn field_predicate(&self, path: &[String], predicate: Predicate<Value>) -> SqlCondition {
        field_condition(path, predicate)
    }

    fn all_of(&self, parts: Vec<SqlCondition>) -> SqlCondition {
        SqlCondition::and(parts)
    }

    fn any_of(&self, parts: Vec<SqlCondition>) -> SqlCondition {
        SqlCondition::or(parts)
    }

    fn match_all(&self) -> SqlCondition {
        SqlCondition::always()
    }

    fn match_none(&self) -> SqlCondition {
        SqlCondition::never()
    }
}

pub struct PostgresAdapter {
    database_url: String,
    schema: String,
    max_connections: u32,
    pool: RwLock<Option<PgPool>>,
    dialect: PostgresDialect,
}

impl PostgresAdapter {
    pub fn new(database_url: impl Into<String>) -> Self {
        PostgresAdapter {
            database_url: database_url.into(),
            schema: classbase_schema(),
            max_connections: 5,
            pool: RwLock::new(None),
            dialect: PostgresDialect,
        }
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    async fn pool(&self) -> Result<PgPool, StoreError> {
        self.pool
            .read()
            .await
            .clone()
            .ok_or_else(|| StoreError::Unavailable("postgres adapter is not connected".into()))
    }

    async fn fetch(&self, q: QueryBuf) -> Result<Vec<NativeRow>, StoreError> {
        let pool = self.pool().await?;
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query(&q.sql);
        for p in q.params {
            query = query.bind(p);
        }
        let rows = query.fetch_all(&pool).await?;
        rows.iter().map(row_to_native).collect()
    }

    async fn execute(&self, q: QueryBuf) -> Result<u64, StoreError> {
        let pool = self.pool().await?;
        tracing::debug!(sql = %q.sql, params = ?q.params, "execute");
        let mut query = sqlx::query(&q.sql);
        for p in q.params {
            query = query.bind(p);
        }
        Ok(query.execute(&pool).await?.rows_affected())
    }
}

fn row_to_native(row: &PgRow) -> Result<NativeRow, StoreError> {
    let id: String = row.try_get(ID_ALIAS)?;
    let data: Value = row.try_get("data")?;
    match data {
        Value::Object(fields) => Ok(NativeRow { id, fields }),
        other => Err(StoreError::Decode(format!("document {} is not an object: {}", id, other))),
    }
}

#[async_trait]
impl StorageAdapter for PostgresAdapter {
    type Dialect = PostgresDialect;

    fn dialect(&self) -> &PostgresDialect {
        &self.dialect
    }

    async fn connect(&self) -> Result<(), StoreError> {
        ensure_database_exists(&self.database_url).await?;
        let pool = PgPoolOptions::new()
            .max_connections(self.max_connections)
            .connect(&self.database_url)
            .await?;
        sqlx::query(&create_schema(&self.schema)).execute(&pool).await?;
        *self.pool.write().await = Some(pool);
        tracing::info!(schema = %self.schema, "postgres adapter connected");
        Ok(())
    }

    async fn close(&self) -> Result<(), StoreError> {
        if let Some(pool) = self.pool.write().await.take() {
            pool.close().await;
        }
        Ok(())
    }

    async fn ensure_class(&self, class: &str) -> Result<(), StoreError> {
        let pool = self.pool().await?;
        sqlx::query(&create_table(&self.schema, class)).execute(&pool).await?;
        Ok(())
    }

    async fn get_object(&self, class: &str, id: &Uuid, fields: &[String]) -> Result<Option<NativeRow>, StoreError> {
        let q = select_where(&self.schema, class, &id_condition(Predicate::Eq(*id)), fields, 0, 0);
        Ok(self.fetch(q).await?.into_iter().next())
    }

    async fn get_objects(
        &self,
        class: &str,
        query: &SqlCondition,
        fields: &[String],
        page: Page,
    ) -> Result<Vec<NativeRow>, StoreError> {
        let q = select_where(&self.schema, class, query, fields, page.offset, page.limit);
        self.fetch(q).await
    }

    async fn create_object(&self, class: &str, data: &Map<String, Value>) -> Result<String, StoreError> {
        let mut ids = self.create_objects(class, std::slice::from_ref(data)).await?;
        ids.pop().ok_or_else(|| StoreError::Query("insert returned no identifier".into()))
    }

    async fn create_objects(&self, class: &str, data: &[Map<String, Value>]) -> Result<Vec<String>, StoreError> {
        if data.is_empty() {
            return Ok(Vec::new());
        }
        let rows: Vec<(Uuid, &Map<String, Value>)> = data.iter().map(|d| (Uuid::now_v7(), d)).collect();
        let q = insert(&self.schema, class, &rows);
        self.execute(q).await?;
        Ok(rows.iter().map(|(id, _)| id.to_string()).collect())
    }

    async fn update_object(&self, class: &str, id: &Uuid, data: &Map<String, Value>) -> Result<u64, StoreError> {
        self.update_objects(class, &id_condition(Predicate::Eq(*id)), data).await
    }

    async fn update_objects(
        &self,
        class: &str,
        query: &SqlCondition,
        data: &Map<String, Value>,
    ) -> Result<u64, StoreError> {
        self.execute(update_where(&self.schema, class, query, data)).await
    }

    async fn delete_object(&self, class: &str, id: &Uuid) -> Result<u64, StoreError> {
        self.delete_objects(class, &id_condition(Predicate::Eq(*id))).await
    }

    async fn delete_objects(&self, class: &str, query: &SqlCondition) -> Result<u64, StoreError> {
        self.execute(delete_where(&self.schema, class, query)).await
    }
}

/// Ensure the database in `database_url` exists; create it if not. Connects to the
/// default `postgres` database to run CREATE DATABASE.
pub async fn ensure_database_exists(database_url: &str) -> Result<(), StoreError> {
    let (admin_url, db_name) = parse_db_name_from_url(database_url)?;
    if db_name.is_empty() || db_name == "postgres" {
        return Ok(());
    }
    let opts = sqlx::postgres::PgConnectOptions::from_str(&admin_url)
        .map_err(|e| StoreError::Unavailable(format!("invalid DATABASE_URL: {}", e)))?;
    let mut conn: sqlx::PgConnection = opts.connect().await?;
    let exists: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
        .bind(&db_name)
        .fetch_one(&mut conn)
        .await?;
    if !exists.0 {
        sqlx::query(&format!("CREATE DATABASE \"{}\"", db_name.replace('"', "\"\"")))
            .execute(&mut conn)
            .await?;
        tracing::info!(database = %db_name, "created database");
    }
    Ok(())
}

fn parse_db_name_from_url(url: &str) -> Result<(String, String), StoreError> {
    let path_start = url
        .rfind('/')
        .ok_or_else(|| StoreError::Unavailable("DATABASE_URL: no path".into()))?
        + 1;
    let path_and_query = url.get(path_start..).unwrap_or("");
    let db_name = path_and_query.split('?').next().unwrap_or("").trim();
    let base = url.get(..path_start).unwrap_or(url);
    Ok((format!("{}postgres", base), db_name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_database_name_from_url() {
        let (admin, db) = parse_db_name_from_url("postgres://u:p@localhost:5432/classbase?sslmode=disable").unwrap();
        assert_eq!(admin, "postgres://u:p@localhost:5432/postgres");
        assert_eq!(db, "classbase");
    }

    #[tokio::test]
    async fn unconnected_adapter_reports_unavailable() {
        let adapter = PostgresAdapter::new("postgres://localhost/none").with_schema("t");
        let err = adapter.ensure_class("Person").await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }

    #[test]
    fn dialect_fails_closed_on_bad_identifier() {
        assert!(PostgresDialect.parse_id("not-a-uuid").is_none());
        let (sql, _) = PostgresDialect.match_none().render();
        assert_eq!(sql, "FALSE");
    }

    #[test]
    fn with_schema_overrides_env_default() {
        let adapter = PostgresAdapter::new("postgres://localhost/x").with_schema("custom");
        assert_eq!(adapter.schema(), "custom");
    }
}
