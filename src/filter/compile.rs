//! Filter compiler: type-checks a `FilterExpression` against a class and translates it through a
//! backend dialect into that backend's native query form.

use crate::config::{ClassDefinition, FieldType, ObjectHandle, SchemaRegistry, RESERVED_ID_FIELD};
use crate::error::AppError;
use crate::filter::{FieldPath, FilterExpression, Operator};
use serde_json::Value;
use std::fmt::Debug;

/// Native comparison handed to a dialect. `V` is a JSON value for fields and the backend's
/// identifier type for `id`.
#[derive(Clone, Debug, PartialEq)]
pub enum Predicate<V> {
    Eq(V),
    Ne(V),
    Gt(V),
    Gte(V),
    Lt(V),
    Lte(V),
    In(Vec<V>),
    NotIn(Vec<V>),
    /// Substring test on a textual field.
    Substring(String),
    NotSubstring(String),
    /// Element membership on a list field.
    HasElement(V),
    LacksElement(V),
}

/// How a backend spells queries. Implemented once per storage adapter.
pub trait QueryDialect: Send + Sync {
    type Query: Clone + Debug + Send + Sync;
    type Id: Clone + Debug + Send + Sync;

    /// Parse the opaque string form of an identifier.
    fn parse_id(&self, raw: &str) -> Option<Self::Id>;

    fn id_predicate(&self, predicate: Predicate<Self::Id>) -> Self::Query;
    fn field_predicate(&self, path: &[String], predicate: Predicate<Value>) -> Self::Query;
    fn all_of(&self, parts: Vec<Self::Query>) -> Self::Query;
    fn any_of(&self, parts: Vec<Self::Query>) -> Self::Query;
    fn match_all(&self) -> Self::Query;
    fn match_none(&self) -> Self::Query;
}

/// Compile an optional filter for `class`. `None` matches every object.
pub fn compile_filter<D: QueryDialect>(
    dialect: &D,
    registry: &SchemaRegistry,
    class: &ClassDefinition,
    filter: Option<&FilterExpression>,
) -> Result<D::Query, AppError> {
    match filter {
        None => Ok(dialect.match_all()),
        Some(expr) => FilterCompiler {
            dialect,
            registry,
            root: class.object,
        }
        .compile(expr),
    }
}

struct FilterCompiler<'a, D> {
    dialect: &'a D,
    registry: &'a SchemaRegistry,
    root: ObjectHandle,
}

/// What a field path addresses after resolution.
enum Target<'a> {
    Id,
    Field(&'a FieldType),
}

impl<D: QueryDialect> FilterCompiler<'_, D> {
    fn compile(&self, expr: &FilterExpression) -> Result<D::Query, AppError> {
        match expr {
            FilterExpression::And(children) => Ok(self.dialect.all_of(self.compile_all(children)?)),
            FilterExpression::Or(children) => Ok(self.dialect.any_of(self.compile_all(children)?)),
            FilterExpression::Compare { path, op, value } => match self.target(path)? {
                Target::Id => self.compile_id(path, *op, value),
                Target::Field(ty) => {
                    let predicate = self.field_predicate(path, ty, *op, value)?;
                    Ok(self.dialect.field_predicate(path.segments(), predicate))
                }
            },
        }
    }

    fn compile_all(&self, children: &[FilterExpression]) -> Result<Vec<D::Query>, AppError> {
        children.iter().map(|c| self.compile(c)).collect()
    }

    fn target(&self, path: &FieldPath) -> Result<Target<'_>, AppError> {
        let segments = path.segments();
        if segments.len() == 1 && segments[0] == RESERVED_ID_FIELD {
            return Ok(Target::Id);
        }
        let mut object = self.registry.object(self.root);
        let mut found: Option<&FieldType> = None;
        for segment in segments {
            if let Some(ty) = found {
                match ty {
                    FieldType::Object(h) => object = self.registry.object(*h),
                    _ => {
                        return Err(AppError::Validation(format!(
                            "filter path {}: '{}' is not a nested object",
                            path, segment
                        )))
                    }
                }
            }
            let field = object.field(segment).ok_or_else(|| {
                AppError::Validation(format!("filter path {}: unknown field '{}' on {}", path, segment, object.name))
            })?;
            found = Some(&field.ty);
        }
        found
            .map(Target::Field)
            .ok_or_else(|| AppError::Validation("empty filter path".into()))
    }

    /// Identifiers: unparsable values make equality branches match nothing and are dropped from sets.
    fn compile_id(&self, path: &FieldPath, op: Operator, value: &Value) -> Result<D::Query, AppError> {
        let parse_one = |v: &Value| -> Result<Option<D::Id>, AppError> {
            let raw = v
                .as_str()
                .ok_or_else(|| AppError::Validation(format!("filter {}: identifier must be a string", path)))?;
            Ok(self.dialect.parse_id(raw))
        };
        let parse_set = |v: &Value| -> Result<Vec<D::Id>, AppError> {
            let items = v
                .as_array()
                .ok_or_else(|| AppError::Validation(format!("filter {}.{}: expected a list", path, op.key())))?;
            Ok(items
                .iter()
                .filter_map(|item| item.as_str().and_then(|raw| self.dialect.parse_id(raw)))
                .collect())
        };
        let predicate = match op {
            Operator::EqualTo => parse_one(value)?.map(Predicate::Eq),
            Operator::NotEqualTo => parse_one(value)?.map(Predicate::Ne),
            Operator::In => Some(Predicate::In(parse_set(value)?)),
            Operator::NotIn => Some(Predicate::NotIn(parse_set(value)?)),
            Operator::Contains
            | Operator::NotContains
            | Operator::GreaterThan
            | Operator::GreaterThanOrEqualTo
            | Operator::LessThan
            | Operator::LessThanOrEqualTo => {
                return Err(AppError::Validation(format!(
                    "filter {}: operator {} is not supported on identifiers",
                    path,
                    op.key()
                )))
            }
        };
        Ok(match predicate {
            Some(p) => self.dialect.id_predicate(p),
            None => self.dialect.match_none(),
        })
    }

    fn field_predicate(
        &self,
        path: &FieldPath,
        ty: &FieldType,
        op: Operator,
        value: &Value,
    ) -> Result<Predicate<Value>, AppError> {
        let mismatch = |expected: &str| {
            AppError::Validation(format!(
                "filter {}.{}: expected {}, got {}",
                path,
                op.key(),
                expected,
                value
            ))
        };
        let unsupported = || {
            AppError::Validation(format!(
                "filter {}: operator {} is not supported on this field",
                path,
                op.key()
            ))
        };

        match ty {
            FieldType::Object(_) => Err(AppError::Validation(format!(
                "filter {}: compare a field of the nested object instead",
                path
            ))),
            FieldType::List(inner) => match op {
                Operator::Contains | Operator::NotContains => {
                    if !self.accepts(inner, value) {
                        return Err(mismatch(&describe(inner)));
                    }
                    Ok(if op == Operator::Contains {
                        Predicate::HasElement(value.clone())
                    } else {
                        Predicate::LacksElement(value.clone())
                    })
                }
                Operator::EqualTo | Operator::NotEqualTo => {
                    if !(value.is_null() || self.accepts(ty, value)) {
                        return Err(mismatch(&describe(ty)));
                    }
                    Ok(if op == Operator::EqualTo {
                        Predicate::Eq(value.clone())
                    } else {
                        Predicate::Ne(value.clone())
                    })
                }
                _ => Err(unsupported()),
            },
            FieldType::Scalar(_) | FieldType::Enum(_) => {
                let (textual, ordered) = match ty {
                    FieldType::Scalar(name) => self
                        .registry
                        .scalar(name)
                        .map(|s| (s.is_textual(), s.is_ordered()))
                        .unwrap_or((false, false)),
                    _ => (false, false),
                };
                match op {
                    Operator::EqualTo | Operator::NotEqualTo => {
                        if !(value.is_null() || self.accepts(ty, value)) {
                            return Err(mismatch(&describe(ty)));
                        }
                        Ok(if op == Operator::EqualTo {
                            Predicate::Eq(value.clone())
                        } else {
                            Predicate::Ne(value.clone())
                        })
                    }
                    Operator::Contains | Operator::NotContains => {
                        if !textual {
                            return Err(unsupported());
                        }
                        let needle = value.as_str().ok_or_else(|| mismatch("a string"))?.to_string();
                        Ok(if op == Operator::Contains {
                            Predicate::Substring(needle)
                        } else {
                            Predicate::NotSubstring(needle)
                        })
                    }
                    Operator::GreaterThan
                    | Operator::GreaterThanOrEqualTo
                    | Operator::LessThan
                    | Operator::LessThanOrEqualTo => {
                        if !ordered {
                            return Err(unsupported());
                        }
                        if !self.accepts(ty, value) {
                            return Err(mismatch(&describe(ty)));
                        }
                        let v = value.clone();
                        Ok(match op {
                            Operator::GreaterThan => Predicate::Gt(v),
                            Operator::GreaterThanOrEqualTo => Predicate::Gte(v),
                            Operator::LessThan => Predicate::Lt(v),
                            _ => Predicate::Lte(v),
                        })
                    }
                    Operator::In | Operator::NotIn => {
                        let items = value.as_array().ok_or_else(|| mismatch("a list"))?;
                        if let Some(bad) = items.iter().find(|i| !self.accepts(ty, i)) {
                            return Err(AppError::Validation(format!(
                                "filter {}.{}: expected {} items, got {}",
                                path,
                                op.key(),
                                describe(ty),
                                bad
                            )));
                        }
                        Ok(if op == Operator::In {
                            Predicate::In(items.clone())
                        } else {
                            Predicate::NotIn(items.clone())
                        })
                    }
                }
            }
        }
    }

    /// Whether `value` is a valid non-null instance of `ty`.
    fn accepts(&self, ty: &FieldType, value: &Value) -> bool {
        match ty {
            FieldType::Scalar(name) => self.registry.scalar(name).map(|s| s.accepts(value)).unwrap_or(false),
            FieldType::Enum(name) => self.registry.enum_by_name(name).map(|e| e.accepts(value)).unwrap_or(false),
            FieldType::List(inner) => value
                .as_array()
                .map(|items| items.iter().all(|i| self.accepts(inner, i)))
                .unwrap_or(false),
            FieldType::Object(_) => value.is_object(),
        }
    }
}

fn describe(ty: &FieldType) -> String {
    match ty {
        FieldType::Scalar(name) | FieldType::Enum(name) => name.clone(),
        FieldType::List(inner) => format!("[{}]", describe(inner)),
        FieldType::Object(_) => "an object".into(),
    }
}
