//! Request validation against the generated shapes.

use crate::compiler::{NamedType, ShapeArena, ShapeField, TypeRef};
use crate::config::SchemaRegistry;
use crate::error::AppError;
use serde_json::{Map, Value};

static NULL: Value = Value::Null;

pub struct RequestValidator<'a> {
    registry: &'a SchemaRegistry,
    shapes: &'a ShapeArena,
}

impl<'a> RequestValidator<'a> {
    pub fn new(registry: &'a SchemaRegistry, shapes: &'a ShapeArena) -> Self {
        RequestValidator { registry, shapes }
    }

    /// Validate call arguments against declared arguments. Unknown arguments are rejected.
    pub fn validate_args(&self, declared: &[ShapeField], args: &Value) -> Result<(), AppError> {
        let empty = Map::new();
        let args = match args {
            Value::Null => &empty,
            Value::Object(map) => map,
            other => return Err(AppError::Validation(format!("arguments must be an object, got {}", other))),
        };
        self.validate_fields(declared, args, "", false)
    }

    /// Validate `value` against `ty`. All required fields must be present.
    pub fn validate(&self, ty: &TypeRef, value: &Value, path: &str) -> Result<(), AppError> {
        self.check(ty, value, path, false)
    }

    /// Validate only the fields present (for updates). Required is not enforced for missing
    /// top-level fields; nested objects are replaced whole and are validated fully.
    pub fn validate_partial(&self, ty: &TypeRef, value: &Value, path: &str) -> Result<(), AppError> {
        self.check(ty, value, path, true)
    }

    fn check(&self, ty: &TypeRef, value: &Value, path: &str, partial: bool) -> Result<(), AppError> {
        match ty {
            TypeRef::NonNull(inner) => {
                if value.is_null() {
                    return Err(AppError::Validation(format!("{} is required", path)));
                }
                self.check(inner, value, path, partial)
            }
            _ if value.is_null() => Ok(()),
            TypeRef::List(inner) => {
                let items = value
                    .as_array()
                    .ok_or_else(|| AppError::Validation(format!("{} must be a list", path)))?;
                for (i, item) in items.iter().enumerate() {
                    self.check(inner, item, &format!("{}[{}]", path, i), false)?;
                }
                Ok(())
            }
            TypeRef::Named(NamedType::Scalar(name)) => {
                let ok = self.registry.scalar(name).map(|s| s.accepts(value)).unwrap_or(false);
                if ok {
                    Ok(())
                } else {
                    Err(AppError::Validation(format!("{} must be a valid {}", path, name)))
                }
            }
            TypeRef::Named(NamedType::Enum(name)) => {
                let e = self
                    .registry
                    .enum_by_name(name)
                    .ok_or_else(|| AppError::Validation(format!("{}: unknown enum {}", path, name)))?;
                if e.accepts(value) {
                    Ok(())
                } else {
                    Err(AppError::Validation(format!(
                        "{} must be one of: {:?}",
                        path,
                        e.values.iter().map(|(_, v)| v).take(5).collect::<Vec<_>>()
                    )))
                }
            }
            TypeRef::Named(NamedType::Shape(h)) => {
                let shape = self.shapes.shape(*h);
                let object = value
                    .as_object()
                    .ok_or_else(|| AppError::Validation(format!("{} must be a {} object", path, shape.name)))?;
                self.validate_fields(&shape.fields, object, path, partial)
            }
        }
    }

    fn validate_fields(
        &self,
        declared: &[ShapeField],
        object: &Map<String, Value>,
        path: &str,
        partial: bool,
    ) -> Result<(), AppError> {
        if let Some(unknown) = object.keys().find(|k| !declared.iter().any(|f| &f.name == *k)) {
            return Err(AppError::Validation(format!("{}: unknown field", join(path, unknown))));
        }
        for field in declared {
            let value = object.get(&field.name);
            if partial && value.is_none() {
                continue;
            }
            let value = value.unwrap_or(&NULL);
            self.check(&field.ty, value, &join(path, &field.name), field.patch)?;
        }
        Ok(())
    }
}

fn join(path: &str, name: &str) -> String {
    if path.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", path, name)
    }
}

/// JSON equality where numbers compare by value (`23 == 23.0`).
pub fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::String(s), Value::String(t)) => s == t,
        (Value::Number(n), Value::Number(m)) => n.as_f64() == m.as_f64(),
        (Value::Array(x), Value::Array(y)) => x.len() == y.len() && x.iter().zip(y).all(|(p, q)| value_eq(p, q)),
        _ => a == b,
    }
}
