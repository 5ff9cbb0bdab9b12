//! Schema validation: naming, uniqueness, references and cycle detection.

use crate::case::is_valid_name;
use crate::config::{FieldType, ObjectDefinition, ObjectHandle, ResolverConfig, SchemaConfig, TypeConfig};
use crate::error::ConfigError;
use regex::Regex;
use std::collections::HashSet;

/// Field name synthesized by the engine for every stored object.
pub const RESERVED_ID_FIELD: &str = "id";

pub const BUILTIN_SCALARS: &[&str] = &["ID", "String", "Int", "Float", "Boolean", "Email", "Date"];

fn check_name(kind: &'static str, name: &str) -> Result<(), ConfigError> {
    if is_valid_name(name) {
        Ok(())
    } else {
        Err(ConfigError::Validation(format!("invalid {} name '{}'", kind, name)))
    }
}

/// Validate names and uniqueness of everything declared. Type references and cycles are checked while resolving.
pub fn validate(config: &SchemaConfig) -> Result<(), ConfigError> {
    // Classes, inline objects, enums and scalars share one type namespace.
    let mut type_names: HashSet<&str> = BUILTIN_SCALARS.iter().copied().collect();

    for s in &config.scalars {
        check_name("scalar", &s.name)?;
        if !type_names.insert(s.name.as_str()) {
            return Err(ConfigError::DuplicateName {
                kind: "scalar",
                name: s.name.clone(),
            });
        }
        if let Some(pattern) = &s.pattern {
            Regex::new(pattern)
                .map_err(|e| ConfigError::Validation(format!("invalid pattern for scalar {}: {}", s.name, e)))?;
        }
    }

    for e in &config.enums {
        check_name("enum", &e.name)?;
        if !type_names.insert(e.name.as_str()) {
            return Err(ConfigError::DuplicateName {
                kind: "enum",
                name: e.name.clone(),
            });
        }
        if e.values.is_empty() {
            return Err(ConfigError::Validation(format!("enum {} has no values", e.name)));
        }
        let values: Vec<_> = e.values.values().collect();
        for (i, v) in values.iter().enumerate() {
            if values[..i].iter().any(|other| crate::service::value_eq(other, v)) {
                return Err(ConfigError::DuplicateName {
                    kind: "enum value",
                    name: format!("{}.{}", e.name, v),
                });
            }
        }
        for label in e.values.keys() {
            check_name("enum case", label)?;
        }
    }

    for c in &config.classes {
        check_name("class", &c.name)?;
        if !type_names.insert(c.name.as_str()) {
            return Err(ConfigError::DuplicateName {
                kind: "class",
                name: c.name.clone(),
            });
        }
    }

    for c in &config.classes {
        validate_fields(&c.name, c.fields.iter().map(|f| (f.name.as_str(), &f.ty)), &mut type_names)?;
    }

    let mut queries = HashSet::new();
    let mut mutations = HashSet::new();
    let all_resolvers = config
        .classes
        .iter()
        .map(|c| &c.resolvers)
        .chain(std::iter::once(&config.resolvers));
    for resolvers in all_resolvers {
        for q in &resolvers.queries {
            validate_resolver(q, &mut queries)?;
        }
        for m in &resolvers.mutations {
            validate_resolver(m, &mut mutations)?;
        }
    }
    Ok(())
}

fn validate_fields<'a>(
    owner: &str,
    fields: impl Iterator<Item = (&'a str, &'a TypeConfig)>,
    type_names: &mut HashSet<&'a str>,
) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for (name, ty) in fields {
        check_name("field", name)?;
        if name == RESERVED_ID_FIELD {
            return Err(ConfigError::Validation(format!("{}: field name 'id' is reserved", owner)));
        }
        if !seen.insert(name) {
            return Err(ConfigError::DuplicateName {
                kind: "field",
                name: format!("{}.{}", owner, name),
            });
        }
        validate_inline_objects(ty, type_names)?;
    }
    Ok(())
}

fn validate_inline_objects<'a>(ty: &'a TypeConfig, type_names: &mut HashSet<&'a str>) -> Result<(), ConfigError> {
    if let Some(items) = &ty.items {
        validate_inline_objects(items, type_names)?;
    }
    if let Some(object) = &ty.object {
        check_name("object", &object.name)?;
        if !type_names.insert(object.name.as_str()) {
            return Err(ConfigError::DuplicateName {
                kind: "object",
                name: object.name.clone(),
            });
        }
        validate_fields(
            &object.name,
            object.fields.iter().map(|f| (f.name.as_str(), &f.ty)),
            type_names,
        )?;
    }
    Ok(())
}

fn validate_resolver<'a>(r: &'a ResolverConfig, names: &mut HashSet<&'a str>) -> Result<(), ConfigError> {
    check_name("resolver", &r.name)?;
    if !names.insert(r.name.as_str()) {
        return Err(ConfigError::DuplicateName {
            kind: "resolver",
            name: r.name.clone(),
        });
    }
    let mut args = HashSet::new();
    for a in &r.args {
        check_name("argument", &a.name)?;
        if !args.insert(a.name.as_str()) {
            return Err(ConfigError::DuplicateName {
                kind: "argument",
                name: format!("{}.{}", r.name, a.name),
            });
        }
    }
    Ok(())
}

/// Order objects so that embedded objects come before their embedders. Rejects any cycle,
/// including self references and cycles through lists.
pub fn order_objects(objects: &[ObjectDefinition]) -> Result<Vec<ObjectHandle>, ConfigError> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        New,
        Visiting,
        Done,
    }

    fn nested(ty: &FieldType) -> Option<ObjectHandle> {
        match ty {
            FieldType::Object(h) => Some(*h),
            FieldType::List(inner) => nested(inner),
            FieldType::Scalar(_) | FieldType::Enum(_) => None,
        }
    }

    fn visit(
        h: ObjectHandle,
        objects: &[ObjectDefinition],
        marks: &mut [Mark],
        path: &mut Vec<ObjectHandle>,
        out: &mut Vec<ObjectHandle>,
    ) -> Result<(), ConfigError> {
        match marks[h.0] {
            Mark::Done => return Ok(()),
            Mark::Visiting => {
                let start = path.iter().position(|p| *p == h).unwrap_or(0);
                let mut names: Vec<&str> = path[start..].iter().map(|p| objects[p.0].name.as_str()).collect();
                names.push(objects[h.0].name.as_str());
                return Err(ConfigError::CyclicReference(names.join(" -> ")));
            }
            Mark::New => {}
        }
        marks[h.0] = Mark::Visiting;
        path.push(h);
        for f in &objects[h.0].fields {
            if let Some(child) = nested(&f.ty) {
                visit(child, objects, marks, path, out)?;
            }
        }
        path.pop();
        marks[h.0] = Mark::Done;
        out.push(h);
        Ok(())
    }

    let mut marks = vec![Mark::New; objects.len()];
    let mut out = Vec::with_capacity(objects.len());
    let mut path = Vec::new();
    for i in 0..objects.len() {
        visit(ObjectHandle(i), objects, &mut marks, &mut path, &mut out)?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ClassConfig, EnumConfig, FieldConfig, FieldDefinition, ObjectConfig, ScalarConfig};
    use serde_json::json;

    fn obj(name: &str, fields: Vec<(&str, FieldType)>) -> ObjectDefinition {
        ObjectDefinition {
            name: name.into(),
            fields: fields
                .into_iter()
                .map(|(n, ty)| FieldDefinition {
                    name: n.into(),
                    ty,
                    required: false,
                    description: None,
                })
                .collect(),
            is_class: true,
        }
    }

    #[test]
    fn rejects_duplicate_field_names_case_sensitively() {
        let mut config = SchemaConfig::default();
        config.classes.push(ClassConfig::new(
            "Person",
            vec![
                FieldConfig::new("name", TypeConfig::named("String")),
                FieldConfig::new("name", TypeConfig::named("String")),
            ],
        ));
        assert!(matches!(validate(&config), Err(ConfigError::DuplicateName { kind: "field", .. })));

        config.classes[0].fields[1].name = "Name".into();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn rejects_type_name_collisions_across_kinds() {
        let config = SchemaConfig {
            classes: vec![ClassConfig::new("Role", vec![])],
            enums: vec![EnumConfig {
                name: "Role".into(),
                values: json!({ "Admin": "admin" }).as_object().cloned().unwrap_or_default(),
                description: None,
            }],
            ..Default::default()
        };
        assert!(matches!(validate(&config), Err(ConfigError::DuplicateName { kind: "class", .. })));
    }

    #[test]
    fn rejects_custom_scalar_shadowing_builtin() {
        let config = SchemaConfig {
            scalars: vec![ScalarConfig {
                name: "String".into(),
                base: Default::default(),
                pattern: None,
                description: None,
            }],
            ..Default::default()
        };
        assert!(validate(&config).is_err());
    }

    #[test]
    fn rejects_duplicate_enum_values() {
        let config = SchemaConfig {
            enums: vec![EnumConfig {
                name: "Level".into(),
                values: json!({ "Low": 1, "Bottom": 1.0 }).as_object().cloned().unwrap_or_default(),
                description: None,
            }],
            ..Default::default()
        };
        assert!(matches!(validate(&config), Err(ConfigError::DuplicateName { kind: "enum value", .. })));
    }

    #[test]
    fn rejects_reserved_id_and_invalid_names() {
        let mut config = SchemaConfig::default();
        config
            .classes
            .push(ClassConfig::new("Person", vec![FieldConfig::new("id", TypeConfig::named("String"))]));
        assert!(validate(&config).is_err());

        config.classes[0] = ClassConfig::new("Bad Name", vec![]);
        assert!(validate(&config).is_err());
    }

    #[test]
    fn inline_object_names_join_the_namespace() {
        let address = ObjectConfig {
            name: "Person".into(),
            fields: vec![],
        };
        let mut config = SchemaConfig::default();
        config
            .classes
            .push(ClassConfig::new("Person", vec![FieldConfig::new("address", TypeConfig::object(address))]));
        assert!(matches!(validate(&config), Err(ConfigError::DuplicateName { kind: "object", .. })));
    }

    #[test]
    fn orders_leaves_first() {
        let objects = vec![
            obj("Person", vec![("address", FieldType::Object(ObjectHandle(1)))]),
            obj("Address", vec![("geo", FieldType::List(Box::new(FieldType::Object(ObjectHandle(2)))))]),
            obj("Geo", vec![("lat", FieldType::Scalar("Float".into()))]),
        ];
        let order = order_objects(&objects).unwrap();
        assert_eq!(order, vec![ObjectHandle(2), ObjectHandle(1), ObjectHandle(0)]);
    }

    #[test]
    fn detects_cycles_through_lists_and_self_references() {
        let objects = vec![
            obj("A", vec![("b", FieldType::Object(ObjectHandle(1)))]),
            obj("B", vec![("a", FieldType::List(Box::new(FieldType::Object(ObjectHandle(0)))))]),
        ];
        let err = order_objects(&objects).unwrap_err();
        assert_eq!(err, ConfigError::CyclicReference("A -> B -> A".into()));

        let selfref = vec![obj("Node", vec![("next", FieldType::Object(ObjectHandle(0)))])];
        assert!(order_objects(&selfref).is_err());
    }
}
