//! Shape arena: every generated object, input and filter shape, referenced by handle.
//! Leaf shapes are built first and parents refer to them by index, never by re-walking.

use crate::case::{input_name, leaf_where_name, where_name};
use crate::config::{
    FieldType, ObjectHandle, SchemaRegistry, TypeConfig, ARRAY_TYPE, ID_SCALAR, OBJECT_TYPE, RESERVED_ID_FIELD,
};
use crate::error::ConfigError;
use crate::filter::{Operator, AND_KEY, OR_KEY};
use std::collections::HashMap;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShapeHandle(pub usize);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NamedType {
    Scalar(String),
    Enum(String),
    Shape(ShapeHandle),
}

/// Reference to a type as it appears on a field or argument.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TypeRef {
    Named(NamedType),
    List(Box<TypeRef>),
    NonNull(Box<TypeRef>),
}

impl TypeRef {
    pub fn scalar(name: &str) -> Self {
        TypeRef::Named(NamedType::Scalar(name.to_string()))
    }

    pub fn shape(handle: ShapeHandle) -> Self {
        TypeRef::Named(NamedType::Shape(handle))
    }

    pub fn list(self) -> Self {
        TypeRef::List(Box::new(self))
    }

    pub fn non_null(self) -> Self {
        match self {
            TypeRef::NonNull(_) => self,
            other => TypeRef::NonNull(Box::new(other)),
        }
    }

    pub fn is_non_null(&self) -> bool {
        matches!(self, TypeRef::NonNull(_))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShapeKind {
    /// Returned by operations.
    Object,
    /// Accepted as argument data.
    Input,
    /// Accepted as a `where` argument.
    Filter,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShapeField {
    pub name: String,
    pub ty: TypeRef,
    /// The value is a partial update: missing required fields of its shape are accepted.
    pub patch: bool,
    pub description: Option<String>,
}

impl ShapeField {
    pub fn new(name: &str, ty: TypeRef) -> Self {
        ShapeField {
            name: name.to_string(),
            ty,
            patch: false,
            description: None,
        }
    }

    pub fn patch(mut self) -> Self {
        self.patch = true;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Shape {
    pub name: String,
    pub kind: ShapeKind,
    pub fields: Vec<ShapeField>,
}

impl Shape {
    pub fn field(&self, name: &str) -> Option<&ShapeField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// All shapes of a compiled API. Scalar and enum names are listed first, then shapes in build order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ShapeArena {
    pub scalars: Vec<String>,
    pub enums: Vec<String>,
    shapes: Vec<Shape>,
    by_name: HashMap<String, ShapeHandle>,
}

impl ShapeArena {
    pub fn shape(&self, handle: ShapeHandle) -> &Shape {
        &self.shapes[handle.0]
    }

    pub fn shapes(&self) -> &[Shape] {
        &self.shapes
    }

    pub fn by_name(&self, name: &str) -> Option<ShapeHandle> {
        self.by_name.get(name).copied()
    }

    pub fn get(&self, name: &str) -> Option<&Shape> {
        self.by_name(name).map(|h| self.shape(h))
    }

    pub fn push(&mut self, shape: Shape) -> Result<ShapeHandle, ConfigError> {
        if self.by_name.contains_key(&shape.name) {
            return Err(ConfigError::DuplicateName {
                kind: "shape",
                name: shape.name,
            });
        }
        let handle = ShapeHandle(self.shapes.len());
        self.by_name.insert(shape.name.clone(), handle);
        self.shapes.push(shape);
        Ok(handle)
    }

    /// Human-readable type, e.g. `[PersonInput!]!`.
    pub fn render(&self, ty: &TypeRef) -> String {
        match ty {
            TypeRef::Named(NamedType::Scalar(n)) | TypeRef::Named(NamedType::Enum(n)) => n.clone(),
            TypeRef::Named(NamedType::Shape(h)) => self.shape(*h).name.clone(),
            TypeRef::List(inner) => format!("[{}]", self.render(inner)),
            TypeRef::NonNull(inner) => format!("{}!", self.render(inner)),
        }
    }
}

impl fmt::Display for ShapeArena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for shape in &self.shapes {
            let keyword = match shape.kind {
                ShapeKind::Object => "type",
                ShapeKind::Input | ShapeKind::Filter => "input",
            };
            writeln!(f, "{} {} {{", keyword, shape.name)?;
            for field in &shape.fields {
                writeln!(f, "  {}: {}", field.name, self.render(&field.ty))?;
            }
            writeln!(f, "}}")?;
        }
        Ok(())
    }
}

/// Shapes generated for one registry object.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ObjectShapes {
    pub output: ShapeHandle,
    pub input: ShapeHandle,
    pub filter: ShapeHandle,
}

/// Builds scalar, enum and object shapes from the registry, leaves first.
pub(crate) struct ShapeBuilder<'a> {
    registry: &'a SchemaRegistry,
    pub arena: ShapeArena,
    objects: HashMap<ObjectHandle, ObjectShapes>,
    leaf_filters: HashMap<String, ShapeHandle>,
}

impl<'a> ShapeBuilder<'a> {
    pub fn new(registry: &'a SchemaRegistry) -> Self {
        ShapeBuilder {
            registry,
            arena: ShapeArena::default(),
            objects: HashMap::new(),
            leaf_filters: HashMap::new(),
        }
    }

    pub fn object_shapes(&self, handle: ObjectHandle) -> Result<ObjectShapes, ConfigError> {
        self.objects.get(&handle).copied().ok_or_else(|| ConfigError::MissingReference {
            kind: "object shape",
            id: self.registry.object(handle).name.clone(),
        })
    }

    /// Scalars and enums, then every object in dependency order.
    pub fn build_objects(&mut self) -> Result<(), ConfigError> {
        self.arena.scalars = self.registry.scalars().iter().map(|s| s.name.clone()).collect();
        self.arena.enums = self.registry.enums().iter().map(|e| e.name.clone()).collect();
        for &handle in self.registry.object_order() {
            let shapes = self.build_object(handle)?;
            self.objects.insert(handle, shapes);
        }
        Ok(())
    }

    fn build_object(&mut self, handle: ObjectHandle) -> Result<ObjectShapes, ConfigError> {
        let object = self.registry.object(handle);
        let mut output_fields = Vec::with_capacity(object.fields.len() + 1);
        let mut input_fields = Vec::with_capacity(object.fields.len());
        let mut filter_fields = Vec::with_capacity(object.fields.len() + 3);
        if object.is_class {
            output_fields.push(ShapeField::new(RESERVED_ID_FIELD, TypeRef::scalar(ID_SCALAR).non_null()));
            filter_fields.push(ShapeField::new(
                RESERVED_ID_FIELD,
                TypeRef::shape(self.leaf_filter(&FieldType::Scalar(ID_SCALAR.into()))?),
            ));
        }
        for field in &object.fields {
            let mut output = self.field_type(&field.ty, false)?;
            let mut input = self.field_type(&field.ty, true)?;
            if field.required {
                output = output.non_null();
                input = input.non_null();
            }
            output_fields.push(ShapeField {
                description: field.description.clone(),
                ..ShapeField::new(&field.name, output)
            });
            input_fields.push(ShapeField {
                description: field.description.clone(),
                ..ShapeField::new(&field.name, input)
            });
            if let Some(filter) = self.filter_type(&field.ty)? {
                filter_fields.push(ShapeField::new(&field.name, filter));
            }
        }

        let output = self.arena.push(Shape {
            name: object.name.clone(),
            kind: ShapeKind::Object,
            fields: output_fields,
        })?;
        let input = self.arena.push(Shape {
            name: input_name(&object.name),
            kind: ShapeKind::Input,
            fields: input_fields,
        })?;
        let filter_handle = ShapeHandle(self.arena.shapes.len());
        if object.is_class {
            let self_list = TypeRef::shape(filter_handle).non_null().list();
            filter_fields.push(ShapeField::new(AND_KEY, self_list.clone()));
            filter_fields.push(ShapeField::new(OR_KEY, self_list));
        }
        let filter = self.arena.push(Shape {
            name: where_name(&object.name),
            kind: ShapeKind::Filter,
            fields: filter_fields,
        })?;
        Ok(ObjectShapes { output, input, filter })
    }

    fn field_type(&self, ty: &FieldType, input: bool) -> Result<TypeRef, ConfigError> {
        Ok(match ty {
            FieldType::Scalar(name) => TypeRef::scalar(name),
            FieldType::Enum(name) => TypeRef::Named(NamedType::Enum(name.clone())),
            FieldType::Object(h) => {
                let shapes = self.object_shapes(*h)?;
                TypeRef::shape(if input { shapes.input } else { shapes.output })
            }
            FieldType::List(inner) => self.field_type(inner, input)?.list(),
        })
    }

    /// Filter type of a field, or `None` when the field cannot be filtered on.
    fn filter_type(&mut self, ty: &FieldType) -> Result<Option<TypeRef>, ConfigError> {
        match ty {
            FieldType::Object(h) => Ok(Some(TypeRef::shape(self.object_shapes(*h)?.filter))),
            FieldType::List(inner) if matches!(**inner, FieldType::Object(_) | FieldType::List(_)) => Ok(None),
            _ => Ok(Some(TypeRef::shape(self.leaf_filter(ty)?))),
        }
    }

    /// Operator shape for a scalar, enum or list-of-leaf field, shared by every field of that type.
    fn leaf_filter(&mut self, ty: &FieldType) -> Result<ShapeHandle, ConfigError> {
        let (leaf, list) = match ty {
            FieldType::List(inner) => (&**inner, true),
            other => (other, false),
        };
        let (type_name, value) = match leaf {
            FieldType::Scalar(n) => (n.as_str(), TypeRef::scalar(n)),
            FieldType::Enum(n) => (n.as_str(), TypeRef::Named(NamedType::Enum(n.clone()))),
            FieldType::Object(_) | FieldType::List(_) => {
                return Err(ConfigError::Validation("nested lists and objects have no leaf filter".into()))
            }
        };
        let name = leaf_where_name(type_name, list);
        if let Some(h) = self.leaf_filters.get(&name) {
            return Ok(*h);
        }

        let operators: Vec<Operator> = if list {
            vec![Operator::EqualTo, Operator::NotEqualTo, Operator::Contains, Operator::NotContains]
        } else {
            let scalar = match leaf {
                FieldType::Scalar(n) => self.registry.scalar(n),
                _ => None,
            };
            let is_id = type_name == ID_SCALAR;
            Operator::ALL
                .into_iter()
                .filter(|op| match op {
                    Operator::EqualTo | Operator::NotEqualTo | Operator::In | Operator::NotIn => true,
                    Operator::Contains | Operator::NotContains => {
                        !is_id && scalar.map(|s| s.is_textual()).unwrap_or(false)
                    }
                    Operator::GreaterThan
                    | Operator::GreaterThanOrEqualTo
                    | Operator::LessThan
                    | Operator::LessThanOrEqualTo => !is_id && scalar.map(|s| s.is_ordered()).unwrap_or(false),
                })
                .collect()
        };
        let fields = operators
            .into_iter()
            .map(|op| {
                let ty = match op {
                    Operator::In | Operator::NotIn => value.clone().non_null().list(),
                    Operator::EqualTo | Operator::NotEqualTo if list => value.clone().list(),
                    _ => value.clone(),
                };
                ShapeField::new(op.key(), ty)
            })
            .collect();
        let handle = self.arena.push(Shape {
            name: name.clone(),
            kind: ShapeKind::Filter,
            fields,
        })?;
        self.leaf_filters.insert(name, handle);
        Ok(handle)
    }

    /// Type of a custom resolver argument or result. Objects must reference a declared class.
    pub fn config_type(&self, ty: &TypeConfig, input: bool) -> Result<TypeRef, ConfigError> {
        match ty.type_.as_str() {
            OBJECT_TYPE => {
                let class = ty.class.as_deref().ok_or_else(|| {
                    ConfigError::Validation("resolver object types must reference a class".into())
                })?;
                let class = self.registry.resolve(class).map_err(|_| ConfigError::MissingReference {
                    kind: "class",
                    id: class.to_string(),
                })?;
                let shapes = self.object_shapes(class.object)?;
                Ok(TypeRef::shape(if input { shapes.input } else { shapes.output }))
            }
            ARRAY_TYPE => {
                let items = ty
                    .items
                    .as_ref()
                    .ok_or_else(|| ConfigError::Validation("Array type needs 'items'".into()))?;
                Ok(self.config_type(items, input)?.list())
            }
            name if self.registry.scalar(name).is_some() => Ok(TypeRef::scalar(name)),
            name if self.registry.enum_by_name(name).is_some() => Ok(TypeRef::Named(NamedType::Enum(name.to_string()))),
            name => Err(ConfigError::MissingReference {
                kind: "type",
                id: name.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{resolve, SchemaConfig};
    use serde_json::json;

    fn build() -> ShapeArena {
        let config: SchemaConfig = serde_json::from_value(json!({
            "classes": [{
                "name": "Person",
                "fields": [
                    { "name": "name", "type": "String", "required": true },
                    { "name": "age", "type": "Int" },
                    { "name": "tags", "type": "Array", "items": { "type": "String" } },
                    { "name": "address", "type": "Object", "object": {
                        "name": "Address", "fields": [{ "name": "city", "type": "String" }]
                    }}
                ]
            }]
        }))
        .unwrap();
        let registry = resolve(&config).unwrap();
        let mut builder = ShapeBuilder::new(&registry);
        builder.build_objects().unwrap();
        builder.arena
    }

    #[test]
    fn output_shape_has_id_and_required_markers() {
        let arena = build();
        let person = arena.get("Person").unwrap();
        assert_eq!(person.fields[0].name, "id");
        assert_eq!(arena.render(&person.fields[0].ty), "ID!");
        assert_eq!(arena.render(&person.field("name").unwrap().ty), "String!");
        assert_eq!(arena.render(&person.field("address").unwrap().ty), "Address");
        assert_eq!(arena.render(&person.field("tags").unwrap().ty), "[String]");
    }

    #[test]
    fn input_shape_mirrors_fields_without_id() {
        let arena = build();
        let input = arena.get("PersonInput").unwrap();
        assert!(input.field("id").is_none());
        assert_eq!(arena.render(&input.field("address").unwrap().ty), "AddressInput");
    }

    #[test]
    fn filter_shape_expands_leaves_and_composites() {
        let arena = build();
        let filter = arena.get("PersonWhereInput").unwrap();
        let names: Vec<&str> = filter.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["id", "name", "age", "tags", "address", "AND", "OR"]);
        assert_eq!(arena.render(&filter.field("AND").unwrap().ty), "[PersonWhereInput!]");
        assert_eq!(arena.render(&filter.field("address").unwrap().ty), "AddressWhereInput");
        assert!(arena.get("AddressWhereInput").unwrap().field("AND").is_none());

        let int_ops: Vec<&str> = arena.get("IntWhereInput").unwrap().fields.iter().map(|f| f.name.as_str()).collect();
        assert!(int_ops.contains(&"greaterThan"));
        assert!(!int_ops.contains(&"contains"));
        let id_ops: Vec<&str> = arena.get("IDWhereInput").unwrap().fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(id_ops, vec!["equalTo", "notEqualTo", "in", "notIn"]);
        assert!(arena.get("StringListWhereInput").unwrap().field("contains").is_some());
    }

    #[test]
    fn leaf_filters_are_shared() {
        let arena = build();
        assert_eq!(arena.shapes().iter().filter(|s| s.name == "StringWhereInput").count(), 1);
    }
}
