//! Built-in identity-holder class and its enum, merged into every schema.

use crate::config::{ClassConfig, EnumConfig, FieldConfig, ObjectConfig, TypeConfig};
use serde_json::{Map, Value};

/// Name of the identity-holder class.
pub const IDENTITY_CLASS: &str = "User";
pub const AUTHENTICATION_FIELD: &str = "authentication";
pub const AUTHENTICATION_PROVIDER_ENUM: &str = "AuthenticationProvider";

fn identity_fields() -> Vec<FieldConfig> {
    let email_password = ObjectConfig {
        name: "EmailPasswordAuthentication".into(),
        fields: vec![
            FieldConfig::new("email", TypeConfig::named("Email")),
            FieldConfig::new("password", TypeConfig::named("String")),
        ],
    };
    let authentication = ObjectConfig {
        name: "Authentication".into(),
        fields: vec![FieldConfig::new("emailPassword", TypeConfig::object(email_password))],
    };
    vec![
        FieldConfig::new(AUTHENTICATION_FIELD, TypeConfig::object(authentication)),
        FieldConfig::new("provider", TypeConfig::named(AUTHENTICATION_PROVIDER_ENUM)),
        FieldConfig::new("email", TypeConfig::named("Email")),
        FieldConfig::new("verifiedEmail", TypeConfig::named("Boolean")),
        FieldConfig::new("accessToken", TypeConfig::named("String")),
        FieldConfig::new("refreshToken", TypeConfig::named("String")),
    ]
}

/// Merge the identity-holder class into `classes`. A user-declared class of the same name keeps
/// its position and its fields; built-in fields are appended only where the name is free.
/// Running the merge on its own output yields the same classes.
pub fn merge_identity_class(classes: &[ClassConfig]) -> Vec<ClassConfig> {
    let mut out = classes.to_vec();
    match out.iter_mut().find(|c| c.name == IDENTITY_CLASS) {
        Some(user) => {
            for field in identity_fields() {
                if !user.fields.iter().any(|f| f.name == field.name) {
                    user.fields.push(field);
                }
            }
        }
        None => out.push(ClassConfig::new(IDENTITY_CLASS, identity_fields())),
    }
    out
}

/// Add the built-in enums unless the user declared an enum of the same name.
pub fn merge_builtin_enums(enums: &[EnumConfig]) -> Vec<EnumConfig> {
    let mut out = enums.to_vec();
    if !out.iter().any(|e| e.name == AUTHENTICATION_PROVIDER_ENUM) {
        let mut values = Map::new();
        for provider in ["Google", "EmailPassword"] {
            values.insert(provider.to_string(), Value::String(provider.to_string()));
        }
        out.push(EnumConfig {
            name: AUTHENTICATION_PROVIDER_ENUM.into(),
            values,
            description: None,
        });
    }
    out
}
