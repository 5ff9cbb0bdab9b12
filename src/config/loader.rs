//! Build the schema registry from declarative config, and load config from JSON.

use crate::config::builtin::{merge_builtin_enums, merge_identity_class};
use crate::config::resolved::*;
use crate::config::types::*;
use crate::config::validator::{order_objects, validate, BUILTIN_SCALARS};
use crate::error::ConfigError;
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;

const EMAIL_PATTERN: &str = r"^[^@\s]+@[^@\s]+\.[^@\s]+$";

/// Build the registry from a full schema config. Global resolvers are attached as declared.
pub fn resolve(config: &SchemaConfig) -> Result<SchemaRegistry, ConfigError> {
    let mut registry = SchemaRegistry::register(&config.classes, &config.enums, &config.scalars)?;
    registry.resolvers = ResolverDeclarations {
        queries: config.resolvers.queries.clone(),
        mutations: config.resolvers.mutations.clone(),
    };
    // Global resolver names must not clash with class-level ones.
    let full = SchemaConfig {
        classes: merge_identity_class(&config.classes),
        enums: merge_builtin_enums(&config.enums),
        scalars: config.scalars.clone(),
        resolvers: config.resolvers.clone(),
    };
    validate(&full)?;
    Ok(registry)
}

impl SchemaRegistry {
    /// Validate and register classes, enums and scalars, merging the built-in identity class.
    /// Identical inputs always produce identical registries.
    pub fn register(
        classes: &[ClassConfig],
        enums: &[EnumConfig],
        scalars: &[ScalarConfig],
    ) -> Result<SchemaRegistry, ConfigError> {
        let classes = merge_identity_class(classes);
        let enums = merge_builtin_enums(enums);
        let merged = SchemaConfig {
            classes,
            enums,
            scalars: scalars.to_vec(),
            resolvers: ResolversConfig::default(),
        };
        validate(&merged)?;

        let scalars = build_scalars(&merged.scalars)?;
        let enums: Vec<EnumDefinition> = merged
            .enums
            .iter()
            .map(|e| EnumDefinition {
                name: e.name.clone(),
                values: e.values.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            })
            .collect();

        let mut arena = Arena {
            objects: Vec::new(),
            class_handles: HashMap::new(),
            scalars: &scalars,
            enums: &enums,
        };
        // Every class gets its slot first so that class references resolve in any order.
        for c in &merged.classes {
            let handle = ObjectHandle(arena.objects.len());
            arena.objects.push(ObjectDefinition {
                name: c.name.clone(),
                fields: Vec::new(),
                is_class: true,
            });
            arena.class_handles.insert(c.name.clone(), handle);
        }
        let mut class_defs = Vec::with_capacity(merged.classes.len());
        for (i, c) in merged.classes.iter().enumerate() {
            let fields = arena.resolve_fields(&c.fields)?;
            arena.objects[i].fields = fields;
            class_defs.push(ClassDefinition {
                name: c.name.clone(),
                object: ObjectHandle(i),
                permissions: resolve_permissions(&c.permissions),
                resolvers: ResolverDeclarations {
                    queries: c.resolvers.queries.clone(),
                    mutations: c.resolvers.mutations.clone(),
                },
                description: c.description.clone(),
            });
        }

        let objects = arena.objects;
        let object_order = order_objects(&objects)?;
        let class_by_name = class_defs.iter().enumerate().map(|(i, c)| (c.name.clone(), i)).collect();

        tracing::info!(
            classes = class_defs.len(),
            objects = objects.len(),
            enums = enums.len(),
            scalars = scalars.len(),
            "schema registered"
        );
        Ok(SchemaRegistry {
            objects,
            classes: class_defs,
            class_by_name,
            enums,
            scalars,
            object_order,
            resolvers: ResolverDeclarations::default(),
        })
    }
}

struct Arena<'a> {
    objects: Vec<ObjectDefinition>,
    class_handles: HashMap<String, ObjectHandle>,
    scalars: &'a [ScalarDefinition],
    enums: &'a [EnumDefinition],
}

impl Arena<'_> {
    fn resolve_fields(&mut self, fields: &[FieldConfig]) -> Result<Vec<FieldDefinition>, ConfigError> {
        fields
            .iter()
            .map(|f| {
                Ok(FieldDefinition {
                    name: f.name.clone(),
                    ty: self.resolve_type(&f.ty)?,
                    required: f.required,
                    description: f.description.clone(),
                })
            })
            .collect()
    }

    fn resolve_type(&mut self, ty: &TypeConfig) -> Result<FieldType, ConfigError> {
        match ty.type_.as_str() {
            OBJECT_TYPE => match (&ty.object, &ty.class) {
                (Some(inline), None) => {
                    let fields = self.resolve_fields(&inline.fields)?;
                    let handle = ObjectHandle(self.objects.len());
                    self.objects.push(ObjectDefinition {
                        name: inline.name.clone(),
                        fields,
                        is_class: false,
                    });
                    Ok(FieldType::Object(handle))
                }
                (None, Some(class)) => self
                    .class_handles
                    .get(class)
                    .map(|h| FieldType::Object(*h))
                    .ok_or_else(|| ConfigError::MissingReference {
                        kind: "class",
                        id: class.clone(),
                    }),
                _ => Err(ConfigError::Validation(
                    "Object field needs exactly one of 'object' or 'class'".into(),
                )),
            },
            ARRAY_TYPE => {
                let items = ty
                    .items
                    .as_ref()
                    .ok_or_else(|| ConfigError::Validation("Array field needs 'items'".into()))?;
                Ok(FieldType::List(Box::new(self.resolve_type(items)?)))
            }
            name if self.scalars.iter().any(|s| s.name == name) => Ok(FieldType::Scalar(name.to_string())),
            name if self.enums.iter().any(|e| e.name == name) => Ok(FieldType::Enum(name.to_string())),
            name => Err(ConfigError::MissingReference {
                kind: "type",
                id: name.to_string(),
            }),
        }
    }
}

fn build_scalars(custom: &[ScalarConfig]) -> Result<Vec<ScalarDefinition>, ConfigError> {
    let mut out = Vec::with_capacity(BUILTIN_SCALARS.len() + custom.len());
    for &name in BUILTIN_SCALARS {
        let (base, pattern) = match name {
            "Int" => (ScalarBase::Int, None),
            "Float" => (ScalarBase::Float, None),
            "Boolean" => (ScalarBase::Boolean, None),
            "Email" => (ScalarBase::String, Some(EMAIL_PATTERN)),
            _ => (ScalarBase::String, None),
        };
        out.push(ScalarDefinition {
            name: name.to_string(),
            base,
            pattern: pattern.map(compile_pattern).transpose()?,
            description: None,
            builtin: true,
        });
    }
    for s in custom {
        out.push(ScalarDefinition {
            name: s.name.clone(),
            base: s.base,
            pattern: s.pattern.as_deref().map(compile_pattern).transpose()?,
            description: s.description.clone(),
            builtin: false,
        });
    }
    Ok(out)
}

fn compile_pattern(pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern).map_err(|e| ConfigError::Validation(format!("invalid pattern '{}': {}", pattern, e)))
}

fn resolve_permissions(config: &PermissionsConfig) -> Permissions {
    let mut rules = HashMap::new();
    for (kind, rule) in [
        (PermissionKind::Read, &config.read),
        (PermissionKind::Create, &config.create),
        (PermissionKind::Update, &config.update),
        (PermissionKind::Delete, &config.delete),
    ] {
        if let Some(rule) = rule {
            rules.insert(
                kind,
                PermissionRule {
                    authenticated: rule.authenticated,
                    roles: rule.roles.clone(),
                },
            );
        }
    }
    Permissions { rules }
}

/// Parse a schema config from a JSON string.
pub fn load_from_str(json: &str) -> Result<SchemaConfig, ConfigError> {
    serde_json::from_str(json).map_err(|e| ConfigError::Load(e.to_string()))
}

/// Read a schema config from a JSON file.
pub async fn load_from_path(path: impl AsRef<Path>) -> Result<SchemaConfig, ConfigError> {
    let path = path.as_ref();
    tracing::debug!(path = %path.display(), "loading schema");
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
    load_from_str(&raw)
}
