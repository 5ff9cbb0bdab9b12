//! Builds parameterized statements over per-class document tables:
//! `(id UUID PRIMARY KEY, data JSONB, created_at, updated_at)`.

use crate::filter::Predicate;
use crate::sql::PgBindValue;
use serde_json::{Map, Value};
use uuid::Uuid;

/// Column alias carrying the identifier in string form.
pub const ID_ALIAS: &str = "_id";

/// Quote identifier for PostgreSQL (safe: only from validated schema names).
fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

fn literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Full qualified table name.
pub fn qualified_table(schema: &str, class: &str) -> String {
    format!("{}.{}", quoted(schema), quoted(class))
}

pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<PgBindValue>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    /// Append a parameter and return its placeholder with the matching cast.
    fn push_param(&mut self, v: PgBindValue) -> String {
        let placeholder = format!("${}::{}", self.params.len() + 1, v.cast());
        self.params.push(v);
        placeholder
    }

    /// Render a condition, numbering its parameters after the ones already pushed.
    fn push_condition(&mut self, condition: &SqlCondition) -> String {
        let mut out = String::new();
        for part in &condition.parts {
            match part {
                SqlPart::Text(s) => out.push_str(s),
                SqlPart::Param(v) => out.push_str(&self.push_param(v.clone())),
            }
        }
        out
    }
}

#[derive(Clone, Debug, PartialEq)]
enum SqlPart {
    Text(String),
    Param(PgBindValue),
}

/// A WHERE fragment whose parameters are numbered only when placed into a statement.
#[derive(Clone, Debug, PartialEq)]
pub struct SqlCondition {
    parts: Vec<SqlPart>,
}

impl SqlCondition {
    fn raw(sql: impl Into<String>) -> Self {
        SqlCondition {
            parts: vec![SqlPart::Text(sql.into())],
        }
    }

    pub fn always() -> Self {
        Self::raw("TRUE")
    }

    pub fn never() -> Self {
        Self::raw("FALSE")
    }

    fn sql(mut self, s: &str) -> Self {
        self.parts.push(SqlPart::Text(s.to_string()));
        self
    }

    fn param(mut self, v: PgBindValue) -> Self {
        self.parts.push(SqlPart::Param(v));
        self
    }

    fn join(parts: Vec<SqlCondition>, separator: &str, empty: SqlCondition) -> Self {
        if parts.is_empty() {
            return empty;
        }
        let mut out = Self::raw("(");
        for (i, part) in parts.into_iter().enumerate() {
            if i > 0 {
                out = out.sql(separator);
            }
            out.parts.extend(part.parts);
        }
        out.sql(")")
    }

    pub fn and(parts: Vec<SqlCondition>) -> Self {
        Self::join(parts, " AND ", Self::always())
    }

    pub fn or(parts: Vec<SqlCondition>) -> Self {
        Self::join(parts, " OR ", Self::never())
    }

    /// Complement that treats SQL NULL as "did not match".
    fn negate(self) -> Self {
        let mut out = Self::raw("NOT COALESCE(");
        out.parts.extend(self.parts);
        out.sql(", FALSE)")
    }

    /// Render with parameters starting at `$1`.
    pub fn render(&self) -> (String, Vec<PgBindValue>) {
        let mut q = QueryBuf::new();
        let sql = q.push_condition(self);
        (sql, q.params)
    }
}

fn json_path(path: &[String]) -> String {
    format!("data #> {}", literal(&format!("{{{}}}", path.join(","))))
}

fn text_path(path: &[String]) -> String {
    format!("data #>> {}", literal(&format!("{{{}}}", path.join(","))))
}

fn value_in(target: &str, values: Vec<PgBindValue>) -> SqlCondition {
    if values.is_empty() {
        return SqlCondition::never();
    }
    let mut out = SqlCondition::raw(format!("{} IN (", target));
    for (i, v) in values.into_iter().enumerate() {
        if i > 0 {
            out = out.sql(", ");
        }
        out = out.param(v);
    }
    out.sql(")")
}

fn compare(target: &str, op: &str, v: PgBindValue) -> SqlCondition {
    SqlCondition::raw(format!("{} {} ", target, op)).param(v)
}

/// Condition over a (possibly nested) document field.
pub fn field_condition(path: &[String], predicate: Predicate<Value>) -> SqlCondition {
    let target = json_path(path);
    match predicate {
        Predicate::Eq(Value::Null) => SqlCondition::raw(format!("({0} IS NULL OR {0} = 'null'::jsonb)", target)),
        Predicate::Eq(v) => compare(&target, "=", PgBindValue::Json(v)),
        Predicate::Ne(v) => field_condition(path, Predicate::Eq(v)).negate(),
        Predicate::Gt(v) => compare(&target, ">", PgBindValue::Json(v)),
        Predicate::Gte(v) => compare(&target, ">=", PgBindValue::Json(v)),
        Predicate::Lt(v) => compare(&target, "<", PgBindValue::Json(v)),
        Predicate::Lte(v) => compare(&target, "<=", PgBindValue::Json(v)),
        Predicate::In(vs) => value_in(&target, vs.into_iter().map(PgBindValue::Json).collect()),
        Predicate::NotIn(vs) => field_condition(path, Predicate::In(vs)).negate(),
        Predicate::Substring(s) => SqlCondition::raw(format!("strpos({}, ", text_path(path)))
            .param(PgBindValue::Text(s))
            .sql(") > 0"),
        Predicate::NotSubstring(s) => field_condition(path, Predicate::Substring(s)).negate(),
        Predicate::HasElement(v) => SqlCondition::raw(format!("{} @> jsonb_build_array(", target))
            .param(PgBindValue::Json(v))
            .sql(")"),
        Predicate::LacksElement(v) => field_condition(path, Predicate::HasElement(v)).negate(),
    }
}

/// Condition over the identifier column.
pub fn id_condition(predicate: Predicate<Uuid>) -> SqlCondition {
    match predicate {
        Predicate::Eq(id) => compare("id", "=", PgBindValue::Uuid(id)),
        Predicate::Ne(id) => compare("id", "<>", PgBindValue::Uuid(id)),
        Predicate::Gt(id) => compare("id", ">", PgBindValue::Uuid(id)),
        Predicate::Gte(id) => compare("id", ">=", PgBindValue::Uuid(id)),
        Predicate::Lt(id) => compare("id", "<", PgBindValue::Uuid(id)),
        Predicate::Lte(id) => compare("id", "<=", PgBindValue::Uuid(id)),
        Predicate::In(ids) => value_in("id", ids.into_iter().map(PgBindValue::Uuid).collect()),
        Predicate::NotIn(ids) => id_condition(Predicate::In(ids)).negate(),
        Predicate::Substring(s) => SqlCondition::raw("strpos(id::text, ")
            .param(PgBindValue::Text(s))
            .sql(") > 0"),
        Predicate::NotSubstring(s) => id_condition(Predicate::Substring(s)).negate(),
        Predicate::HasElement(_) => SqlCondition::never(),
        Predicate::LacksElement(_) => SqlCondition::always(),
    }
}

pub fn create_schema(schema: &str) -> String {
    format!("CREATE SCHEMA IF NOT EXISTS {}", quoted(schema))
}

pub fn create_table(schema: &str, class: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\
         id UUID PRIMARY KEY, \
         data JSONB NOT NULL DEFAULT '{{}}'::jsonb, \
         created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(), \
         updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW())",
        qualified_table(schema, class)
    )
}

/// SELECT list: id as text, and the document restricted to `fields` when a projection is given.
fn select_column_list(fields: &[String]) -> String {
    let data = if fields.is_empty() {
        "data".to_string()
    } else {
        let keys: Vec<String> = fields.iter().map(|f| literal(f)).collect();
        format!(
            "(SELECT COALESCE(jsonb_object_agg(key, value), '{{}}'::jsonb) FROM jsonb_each(data) WHERE key IN ({}))",
            keys.join(", ")
        )
    };
    format!("id::text AS {}, {} AS data", quoted(ID_ALIAS), data)
}

/// SELECT matching rows ORDER BY id, optional LIMIT/OFFSET (`limit == 0` means unbounded).
pub fn select_where(
    schema: &str,
    class: &str,
    condition: &SqlCondition,
    fields: &[String],
    offset: usize,
    limit: usize,
) -> QueryBuf {
    let mut q = QueryBuf::new();
    let where_clause = q.push_condition(condition);
    let limit_clause = if limit > 0 { format!(" LIMIT {}", limit) } else { String::new() };
    let offset_clause = if offset > 0 { format!(" OFFSET {}", offset) } else { String::new() };
    q.sql = format!(
        "SELECT {} FROM {} WHERE {} ORDER BY id{}{}",
        select_column_list(fields),
        qualified_table(schema, class),
        where_clause,
        limit_clause,
        offset_clause
    );
    q
}

/// Multi-row INSERT. Identifiers are generated by the caller.
pub fn insert(schema: &str, class: &str, rows: &[(Uuid, &Map<String, Value>)]) -> QueryBuf {
    let mut q = QueryBuf::new();
    let values: Vec<String> = rows
        .iter()
        .map(|(id, data)| {
            let id_ph = q.push_param(PgBindValue::Uuid(*id));
            let data_ph = q.push_param(PgBindValue::Json(Value::Object((*data).clone())));
            format!("({}, {})", id_ph, data_ph)
        })
        .collect();
    q.sql = format!(
        "INSERT INTO {} (id, data) VALUES {}",
        qualified_table(schema, class),
        values.join(", ")
    );
    q
}

/// UPDATE: merge `data` into the top level of every matching document.
pub fn update_where(schema: &str, class: &str, condition: &SqlCondition, data: &Map<String, Value>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let patch = q.push_param(PgBindValue::Json(Value::Object(data.clone())));
    let where_clause = q.push_condition(condition);
    q.sql = format!(
        "UPDATE {} SET data = data || {}, updated_at = NOW() WHERE {}",
        qualified_table(schema, class),
        patch,
        where_clause
    );
    q
}

pub fn delete_where(schema: &str, class: &str, condition: &SqlCondition) -> QueryBuf {
    let mut q = QueryBuf::new();
    let where_clause = q.push_condition(condition);
    q.sql = format!("DELETE FROM {} WHERE {}", qualified_table(schema, class), where_clause);
    q
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(p: &str) -> Vec<String> {
        p.split('.').map(str::to_string).collect()
    }

    #[test]
    fn equality_binds_jsonb() {
        let (sql, params) = field_condition(&path("age"), Predicate::Eq(json!(23))).render();
        assert_eq!(sql, "data #> '{age}' = $1::jsonb");
        assert_eq!(params, vec![PgBindValue::Json(json!(23))]);
    }

    #[test]
    fn nested_path_and_negation() {
        let (sql, _) = field_condition(&path("address.city"), Predicate::Ne(json!("Paris"))).render();
        assert_eq!(sql, "NOT COALESCE(data #> '{address,city}' = $1::jsonb, FALSE)");
    }

    #[test]
    fn in_expands_placeholders_and_empty_is_false() {
        let (sql, params) = field_condition(&path("age"), Predicate::In(vec![json!(1), json!(2)])).render();
        assert_eq!(sql, "data #> '{age}' IN ($1::jsonb, $2::jsonb)");
        assert_eq!(params.len(), 2);
        let (sql, _) = id_condition(Predicate::In(vec![])).render();
        assert_eq!(sql, "FALSE");
    }

    #[test]
    fn substring_and_element_membership() {
        let (sql, _) = field_condition(&path("name"), Predicate::Substring("uc".into())).render();
        assert_eq!(sql, "strpos(data #>> '{name}', $1::text) > 0");
        let (sql, _) = field_condition(&path("tags"), Predicate::HasElement(json!("a"))).render();
        assert_eq!(sql, "data #> '{tags}' @> jsonb_build_array($1::jsonb)");
    }

    #[test]
    fn and_or_number_parameters_in_order() {
        let cond = SqlCondition::or(vec![
            id_condition(Predicate::Eq(Uuid::nil())),
            SqlCondition::and(vec![
                field_condition(&path("a"), Predicate::Gt(json!(1))),
                field_condition(&path("b"), Predicate::Eq(Value::Null)),
            ]),
        ]);
        let (sql, params) = cond.render();
        assert_eq!(
            sql,
            "(id = $1::uuid OR (data #> '{a}' > $2::jsonb AND (data #> '{b}' IS NULL OR data #> '{b}' = 'null'::jsonb)))"
        );
        assert_eq!(params.len(), 2);
        assert_eq!(SqlCondition::and(vec![]).render().0, "TRUE");
    }

    #[test]
    fn update_numbers_condition_after_patch() {
        let data = json!({ "age": 2 });
        let q = update_where("cb", "Person", &id_condition(Predicate::Eq(Uuid::nil())), data.as_object().unwrap());
        assert_eq!(
            q.sql,
            "UPDATE \"cb\".\"Person\" SET data = data || $1::jsonb, updated_at = NOW() WHERE id = $2::uuid"
        );
    }

    #[test]
    fn select_applies_projection_and_window() {
        let q = select_where("cb", "Person", &SqlCondition::always(), &["name".into()], 2, 5);
        assert_eq!(
            q.sql,
            "SELECT id::text AS \"_id\", (SELECT COALESCE(jsonb_object_agg(key, value), '{}'::jsonb) FROM jsonb_each(data) WHERE key IN ('name')) AS data FROM \"cb\".\"Person\" WHERE TRUE ORDER BY id LIMIT 5 OFFSET 2"
        );
    }

    #[test]
    fn insert_binds_id_and_document_per_row() {
        let a = json!({ "name": "A" });
        let b = json!({ "name": "B" });
        let rows = [(Uuid::nil(), a.as_object().unwrap()), (Uuid::from_u128(1), b.as_object().unwrap())];
        let q = insert("cb", "Person", &rows);
        assert_eq!(
            q.sql,
            "INSERT INTO \"cb\".\"Person\" (id, data) VALUES ($1::uuid, $2::jsonb), ($3::uuid, $4::jsonb)"
        );
        assert_eq!(q.params.len(), 4);
    }
}
