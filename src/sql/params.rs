//! Bind values for the document tables. Every value travels as text and is cast in SQL
//! (`$n::jsonb`, `$n::uuid`), so one bind type covers documents, identifiers and substrings.

use serde_json::Value;
use sqlx::encode::{Encode, IsNull};
use sqlx::postgres::{PgTypeInfo, Postgres};
use sqlx::Database;

#[derive(Clone, Debug, PartialEq)]
pub enum PgBindValue {
    Text(String),
    Uuid(uuid::Uuid),
    Json(Value),
}

impl PgBindValue {
    /// Placeholder cast matching how the value is interpreted by the statement.
    pub fn cast(&self) -> &'static str {
        match self {
            PgBindValue::Text(_) => "text",
            PgBindValue::Uuid(_) => "uuid",
            PgBindValue::Json(_) => "jsonb",
        }
    }
}

impl<'q> Encode<'q, Postgres> for PgBindValue {
    fn encode_by_ref(
        &self,
        buf: &mut <Postgres as Database>::ArgumentBuffer<'q>,
    ) -> Result<IsNull, Box<dyn std::error::Error + Send + Sync>> {
        Ok(match self {
            PgBindValue::Text(s) => <&str as Encode<Postgres>>::encode_by_ref(&s.as_str(), buf)?,
            PgBindValue::Uuid(u) => {
                let u_str = u.to_string();
                <&str as Encode<Postgres>>::encode_by_ref(&u_str.as_str(), buf)?
            }
            PgBindValue::Json(v) => {
                let text = v.to_string();
                <&str as Encode<Postgres>>::encode_by_ref(&text.as_str(), buf)?
            }
        })
    }
}

impl sqlx::Type<Postgres> for PgBindValue {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_name("TEXT")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn casts_follow_variant() {
        assert_eq!(PgBindValue::Json(json!(1)).cast(), "jsonb");
        assert_eq!(PgBindValue::Uuid(uuid::Uuid::nil()).cast(), "uuid");
        assert_eq!(PgBindValue::Text("x".into()).cast(), "text");
    }
}
