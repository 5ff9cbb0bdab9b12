//! Resolved schema registry: declarative input validated and flattened into an arena of objects.

use crate::config::{ResolverConfig, ScalarBase};
use crate::error::AppError;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;

/// Handle of an object definition inside the registry arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectHandle(pub usize);

#[derive(Clone, Debug, PartialEq)]
pub enum FieldType {
    Scalar(String),
    Enum(String),
    Object(ObjectHandle),
    List(Box<FieldType>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldDefinition {
    pub name: String,
    pub ty: FieldType,
    pub required: bool,
    pub description: Option<String>,
}

/// A set of named fields. Classes own one as their top level; nested objects are embedded documents.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectDefinition {
    pub name: String,
    pub fields: Vec<FieldDefinition>,
    /// True when this object is the top level of a storage class.
    pub is_class: bool,
}

impl ObjectDefinition {
    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Operation kinds a permission rule can guard.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PermissionKind {
    Read,
    Create,
    Update,
    Delete,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PermissionRule {
    pub authenticated: bool,
    pub roles: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Permissions {
    pub rules: HashMap<PermissionKind, PermissionRule>,
}

impl Permissions {
    pub fn rule(&self, kind: PermissionKind) -> Option<&PermissionRule> {
        self.rules.get(&kind)
    }
}

/// Custom resolvers declared on a class or globally.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResolverDeclarations {
    pub queries: Vec<ResolverConfig>,
    pub mutations: Vec<ResolverConfig>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ClassDefinition {
    pub name: String,
    pub object: ObjectHandle,
    pub permissions: Permissions,
    pub resolvers: ResolverDeclarations,
    pub description: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EnumDefinition {
    pub name: String,
    /// (case label, underlying value) in declaration order.
    pub values: Vec<(String, Value)>,
}

impl EnumDefinition {
    pub fn accepts(&self, v: &Value) -> bool {
        self.values.iter().any(|(_, value)| crate::service::value_eq(value, v))
    }
}

#[derive(Clone, Debug)]
pub struct ScalarDefinition {
    pub name: String,
    pub base: ScalarBase,
    pub pattern: Option<Regex>,
    pub description: Option<String>,
    pub builtin: bool,
}

impl PartialEq for ScalarDefinition {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.base == other.base
            && self.pattern.as_ref().map(Regex::as_str) == other.pattern.as_ref().map(Regex::as_str)
            && self.builtin == other.builtin
    }
}

impl ScalarDefinition {
    /// Whether a non-null JSON value is a valid instance of this scalar.
    pub fn accepts(&self, v: &Value) -> bool {
        if self.name == DATE_SCALAR {
            return v
                .as_str()
                .map(|s| chrono::DateTime::parse_from_rfc3339(s).is_ok())
                .unwrap_or(false);
        }
        let base_ok = match self.base {
            ScalarBase::String => v.is_string(),
            ScalarBase::Int => v.is_i64() || v.is_u64(),
            ScalarBase::Float => v.is_number(),
            ScalarBase::Boolean => v.is_boolean(),
            ScalarBase::Any => !v.is_null(),
        };
        if !base_ok {
            return false;
        }
        match (&self.pattern, v.as_str()) {
            (Some(re), Some(s)) => re.is_match(s),
            _ => true,
        }
    }

    /// String-based scalars support substring operators.
    pub fn is_textual(&self) -> bool {
        self.base == ScalarBase::String
    }

    /// Ordered scalars support range operators.
    pub fn is_ordered(&self) -> bool {
        matches!(self.base, ScalarBase::String | ScalarBase::Int | ScalarBase::Float) || self.name == DATE_SCALAR
    }
}

pub const ID_SCALAR: &str = "ID";
pub const DATE_SCALAR: &str = "Date";

/// The process-wide schema state, built once and passed by reference afterwards.
#[derive(Clone, Debug, PartialEq)]
pub struct SchemaRegistry {
    pub(crate) objects: Vec<ObjectDefinition>,
    pub(crate) classes: Vec<ClassDefinition>,
    pub(crate) class_by_name: HashMap<String, usize>,
    pub(crate) enums: Vec<EnumDefinition>,
    pub(crate) scalars: Vec<ScalarDefinition>,
    /// Objects ordered so that every nested object precedes the objects that embed it.
    pub(crate) object_order: Vec<ObjectHandle>,
    pub(crate) resolvers: ResolverDeclarations,
}

impl SchemaRegistry {
    /// Class by name; `NotFound` if absent.
    pub fn resolve(&self, class_name: &str) -> Result<&ClassDefinition, AppError> {
        self.class_by_name
            .get(class_name)
            .map(|&i| &self.classes[i])
            .ok_or_else(|| AppError::NotFound(format!("class {}", class_name)))
    }

    pub fn classes(&self) -> &[ClassDefinition] {
        &self.classes
    }

    pub fn object(&self, handle: ObjectHandle) -> &ObjectDefinition {
        &self.objects[handle.0]
    }

    /// Top-level object of a class.
    pub fn class_object(&self, class: &ClassDefinition) -> &ObjectDefinition {
        self.object(class.object)
    }

    pub fn object_order(&self) -> &[ObjectHandle] {
        &self.object_order
    }

    pub fn enums(&self) -> &[EnumDefinition] {
        &self.enums
    }

    pub fn enum_by_name(&self, name: &str) -> Option<&EnumDefinition> {
        self.enums.iter().find(|e| e.name == name)
    }

    pub fn scalars(&self) -> &[ScalarDefinition] {
        &self.scalars
    }

    pub fn scalar(&self, name: &str) -> Option<&ScalarDefinition> {
        self.scalars.iter().find(|s| s.name == name)
    }

    /// Resolvers declared outside any class.
    pub fn global_resolvers(&self) -> &ResolverDeclarations {
        &self.resolvers
    }
}
