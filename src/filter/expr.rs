//! Filter intermediate representation and its parsing from the `where` input shape.

use crate::error::AppError;
use serde_json::{Map, Value};
use std::fmt;

/// Fixed operator vocabulary of filter comparisons.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operator {
    EqualTo,
    NotEqualTo,
    Contains,
    NotContains,
    GreaterThan,
    GreaterThanOrEqualTo,
    LessThan,
    LessThanOrEqualTo,
    In,
    NotIn,
}

impl Operator {
    pub const ALL: [Operator; 10] = [
        Operator::EqualTo,
        Operator::NotEqualTo,
        Operator::Contains,
        Operator::NotContains,
        Operator::GreaterThan,
        Operator::GreaterThanOrEqualTo,
        Operator::LessThan,
        Operator::LessThanOrEqualTo,
        Operator::In,
        Operator::NotIn,
    ];

    /// Key used in the `where` input shape.
    pub fn key(self) -> &'static str {
        match self {
            Operator::EqualTo => "equalTo",
            Operator::NotEqualTo => "notEqualTo",
            Operator::Contains => "contains",
            Operator::NotContains => "notContains",
            Operator::GreaterThan => "greaterThan",
            Operator::GreaterThanOrEqualTo => "greaterThanOrEqualTo",
            Operator::LessThan => "lessThan",
            Operator::LessThanOrEqualTo => "lessThanOrEqualTo",
            Operator::In => "in",
            Operator::NotIn => "notIn",
        }
    }

    pub fn from_key(key: &str) -> Option<Operator> {
        Operator::ALL.into_iter().find(|op| op.key() == key)
    }

    /// Operators whose operand is a list of values.
    pub fn takes_list(self) -> bool {
        matches!(self, Operator::In | Operator::NotIn)
    }
}

pub const AND_KEY: &str = "AND";
pub const OR_KEY: &str = "OR";

/// Dotted path to a field, possibly through nested objects.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    pub fn new(segments: Vec<String>) -> Self {
        FieldPath(segments)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    fn prefixed(mut self, head: &str) -> Self {
        self.0.insert(0, head.to_string());
        self
    }
}

impl From<&str> for FieldPath {
    fn from(value: &str) -> Self {
        FieldPath(value.split('.').map(str::to_string).collect())
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

/// A `where` expression. Values are not type-checked until translation.
#[derive(Clone, Debug, PartialEq)]
pub enum FilterExpression {
    Compare {
        path: FieldPath,
        op: Operator,
        value: Value,
    },
    And(Vec<FilterExpression>),
    Or(Vec<FilterExpression>),
}

impl FilterExpression {
    pub fn field(path: impl Into<FieldPath>) -> FieldFilter {
        FieldFilter(path.into())
    }

    /// Disjunction of `id equalTo` for every identifier.
    pub fn id_in_any<'a>(ids: impl IntoIterator<Item = &'a str>) -> Self {
        FilterExpression::Or(
            ids.into_iter()
                .map(|id| FilterExpression::field("id").equal_to(Value::String(id.to_string())))
                .collect(),
        )
    }

    /// Parse the `where` input shape. `None` or an empty object means "match everything".
    ///
    /// Each field key holds an operator object (several operators are combined with AND),
    /// or for nested-object fields a nested `where` of which only the first leaf is kept.
    pub fn from_where(value: &Value) -> Result<Option<FilterExpression>, AppError> {
        match value {
            Value::Null => Ok(None),
            Value::Object(map) => parse_object(map, ""),
            other => Err(AppError::Validation(format!("where must be an object, got {}", other))),
        }
    }
}

/// Builder for one field's comparisons.
pub struct FieldFilter(FieldPath);

impl FieldFilter {
    pub fn compare(self, op: Operator, value: Value) -> FilterExpression {
        FilterExpression::Compare { path: self.0, op, value }
    }

    pub fn equal_to(self, value: impl Into<Value>) -> FilterExpression {
        self.compare(Operator::EqualTo, value.into())
    }

    pub fn not_equal_to(self, value: impl Into<Value>) -> FilterExpression {
        self.compare(Operator::NotEqualTo, value.into())
    }

    pub fn contains(self, value: impl Into<Value>) -> FilterExpression {
        self.compare(Operator::Contains, value.into())
    }

    pub fn greater_than(self, value: impl Into<Value>) -> FilterExpression {
        self.compare(Operator::GreaterThan, value.into())
    }

    pub fn less_than(self, value: impl Into<Value>) -> FilterExpression {
        self.compare(Operator::LessThan, value.into())
    }

    pub fn is_in(self, values: Vec<Value>) -> FilterExpression {
        self.compare(Operator::In, Value::Array(values))
    }

    pub fn not_in(self, values: Vec<Value>) -> FilterExpression {
        self.compare(Operator::NotIn, Value::Array(values))
    }
}

fn parse_object(map: &Map<String, Value>, scope: &str) -> Result<Option<FilterExpression>, AppError> {
    let mut parts = Vec::new();
    for (key, value) in map {
        if value.is_null() {
            continue;
        }
        match key.as_str() {
            AND_KEY | OR_KEY => {
                let items = value
                    .as_array()
                    .ok_or_else(|| AppError::Validation(format!("{}{} must be a list", scope, key)))?;
                let mut children = Vec::with_capacity(items.len());
                for item in items {
                    if let Some(child) = FilterExpression::from_where(item)? {
                        children.push(child);
                    }
                }
                if key == AND_KEY {
                    parts.push(FilterExpression::And(children));
                } else {
                    parts.push(FilterExpression::Or(children));
                }
            }
            field => {
                let inner = value
                    .as_object()
                    .ok_or_else(|| AppError::Validation(format!("{}{} must be an object", scope, field)))?;
                if let Some(expr) = parse_field(field, inner, scope)? {
                    parts.push(expr);
                }
            }
        }
    }
    Ok(match parts.len() {
        0 => None,
        1 => parts.pop(),
        _ => Some(FilterExpression::And(parts)),
    })
}

fn parse_field(field: &str, inner: &Map<String, Value>, scope: &str) -> Result<Option<FilterExpression>, AppError> {
    let is_operator_set = inner.keys().any(|k| Operator::from_key(k).is_some());
    if is_operator_set {
        let mut comparisons = Vec::new();
        for (key, value) in inner {
            let op = Operator::from_key(key)
                .ok_or_else(|| AppError::Validation(format!("{}{}: unknown operator '{}'", scope, field, key)))?;
            if op != Operator::EqualTo && op != Operator::NotEqualTo && value.is_null() {
                continue;
            }
            comparisons.push(FilterExpression::field(field).compare(op, value.clone()));
        }
        return Ok(match comparisons.len() {
            0 => None,
            1 => comparisons.pop(),
            _ => Some(FilterExpression::And(comparisons)),
        });
    }

    // Nested object: compile the inner where and keep its first leaf under a dotted path.
    let nested_scope = format!("{}{}.", scope, field);
    let Some(nested) = parse_object(inner, &nested_scope)? else {
        return Ok(None);
    };
    let mut leaves = Vec::new();
    collect_leaves(nested, &mut leaves);
    let dropped = leaves.len().saturating_sub(1);
    if dropped > 0 {
        tracing::warn!(
            field = %format!("{}{}", scope, field),
            dropped,
            "nested-object filter keeps only its first comparison"
        );
    }
    Ok(leaves.into_iter().next().map(|leaf| match leaf {
        FilterExpression::Compare { path, op, value } => FilterExpression::Compare {
            path: path.prefixed(field),
            op,
            value,
        },
        other => other,
    }))
}

fn collect_leaves(expr: FilterExpression, out: &mut Vec<FilterExpression>) {
    match expr {
        FilterExpression::Compare { .. } => out.push(expr),
        FilterExpression::And(children) | FilterExpression::Or(children) => {
            for child in children {
                collect_leaves(child, out);
            }
        }
    }
}
