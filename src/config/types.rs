//! Raw declarative schema types, as read from JSON.

use serde::{Deserialize, Serialize};

/// Type of a field, argument or resolver result.
///
/// `type` is a scalar name, an enum name, `"Object"` (inline `object` or `class` reference)
/// or `"Array"` (with `items`).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeConfig {
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<ObjectConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<TypeConfig>>,
}

impl TypeConfig {
    pub fn named(name: &str) -> Self {
        TypeConfig {
            type_: name.to_string(),
            ..Default::default()
        }
    }

    pub fn object(object: ObjectConfig) -> Self {
        TypeConfig {
            type_: OBJECT_TYPE.to_string(),
            object: Some(object),
            ..Default::default()
        }
    }

    pub fn class_ref(class: &str) -> Self {
        TypeConfig {
            type_: OBJECT_TYPE.to_string(),
            class: Some(class.to_string()),
            ..Default::default()
        }
    }

    pub fn array(items: TypeConfig) -> Self {
        TypeConfig {
            type_: ARRAY_TYPE.to_string(),
            items: Some(Box::new(items)),
            ..Default::default()
        }
    }
}

pub const OBJECT_TYPE: &str = "Object";
pub const ARRAY_TYPE: &str = "Array";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldConfig {
    pub name: String,
    #[serde(flatten)]
    pub ty: TypeConfig,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl FieldConfig {
    pub fn new(name: &str, ty: TypeConfig) -> Self {
        FieldConfig {
            name: name.to_string(),
            ty,
            required: false,
            description: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Inline nested object (embedded document, not a storage class).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectConfig {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FieldConfig>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PermissionRuleConfig {
    /// Caller must carry a user identity.
    #[serde(default)]
    pub authenticated: bool,
    /// Caller must hold at least one of these roles (empty = any).
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PermissionsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read: Option<PermissionRuleConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create: Option<PermissionRuleConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update: Option<PermissionRuleConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete: Option<PermissionRuleConfig>,
}

/// Declaration of a custom query or mutation. The implementation is bound by name at compile time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResolverConfig {
    pub name: String,
    #[serde(flatten)]
    pub returns: TypeConfig,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub args: Vec<FieldConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolversConfig {
    #[serde(default)]
    pub queries: Vec<ResolverConfig>,
    #[serde(default)]
    pub mutations: Vec<ResolverConfig>,
}

impl ResolversConfig {
    pub fn is_empty(&self) -> bool {
        self.queries.is_empty() && self.mutations.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassConfig {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FieldConfig>,
    #[serde(default)]
    pub permissions: PermissionsConfig,
    #[serde(default, skip_serializing_if = "ResolversConfig::is_empty")]
    pub resolvers: ResolversConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ClassConfig {
    pub fn new(name: &str, fields: Vec<FieldConfig>) -> Self {
        ClassConfig {
            name: name.to_string(),
            fields,
            permissions: PermissionsConfig::default(),
            resolvers: ResolversConfig::default(),
            description: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnumConfig {
    pub name: String,
    /// Case label -> underlying value. Values must be unique within the enum.
    pub values: serde_json::Map<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Base representation a custom scalar accepts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScalarBase {
    String,
    Int,
    Float,
    Boolean,
    #[default]
    Any,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScalarConfig {
    pub name: String,
    #[serde(default)]
    pub base: ScalarBase,
    /// Regex the string form must match (only for `String` base).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Whole declarative schema in one struct.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaConfig {
    #[serde(default)]
    pub classes: Vec<ClassConfig>,
    #[serde(default)]
    pub enums: Vec<EnumConfig>,
    #[serde(default)]
    pub scalars: Vec<ScalarConfig>,
    /// Resolvers not attached to any class.
    #[serde(default)]
    pub resolvers: ResolversConfig,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn field_config_reads_flat_json() {
        let f: FieldConfig = serde_json::from_value(json!({
            "name": "tags",
            "type": "Array",
            "items": { "type": "String" },
            "required": true
        }))
        .unwrap();
        assert_eq!(f.ty, TypeConfig::array(TypeConfig::named("String")));
        assert!(f.required);
    }

    #[test]
    fn class_config_defaults() {
        let c: ClassConfig = serde_json::from_value(json!({
            "name": "Person",
            "fields": [{ "name": "address", "type": "Object", "class": "Address" }]
        }))
        .unwrap();
        assert_eq!(c.fields[0].ty, TypeConfig::class_ref("Address"));
        assert!(c.permissions.read.is_none());
        assert!(c.resolvers.is_empty());
    }

    #[test]
    fn enum_values_keep_declaration_order() {
        let e: EnumConfig = serde_json::from_value(json!({
            "name": "Role",
            "values": { "Zed": "z", "Admin": "admin" }
        }))
        .unwrap();
        let labels: Vec<_> = e.values.keys().cloned().collect();
        assert_eq!(labels, vec!["Zed", "Admin"]);
    }
}
