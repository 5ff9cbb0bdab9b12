//! API compiler: turns the schema registry into shapes and operation descriptors.
//!
//! Order: scalars and enums, then object shapes (leaves first), then the eight generated
//! operations per class, then custom resolvers, which replace a generated operation of the
//! same name. Output depends only on the registry, so compiling twice yields the same API.

mod handlers;
mod operations;
mod resolvers;
mod shapes;

pub use operations::{CompiledApi, CrudKind, OperationDescriptor, OperationKind};
pub use resolvers::{FnResolver, OperationCall, Resolver, ResolverMap};
pub use shapes::{NamedType, ObjectShapes, Shape, ShapeArena, ShapeField, ShapeHandle, ShapeKind, TypeRef};

use crate::case::{custom_input_name, mutation_input_name};
use crate::config::{ClassDefinition, ResolverConfig, SchemaRegistry, ID_SCALAR, RESERVED_ID_FIELD};
use crate::error::ConfigError;
use crate::service::Controller;
use crate::store::StorageAdapter;
use handlers::CrudResolver;
use shapes::ShapeBuilder;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Build only the shapes (no operations). Useful for validation and inspection.
pub fn compile_shapes(registry: &SchemaRegistry) -> Result<ShapeArena, ConfigError> {
    let mut builder = ShapeBuilder::new(registry);
    builder.build_objects()?;
    Ok(builder.arena)
}

/// Compile the full API, binding generated operations to `controller` and custom
/// operations to the implementations in `resolvers`.
pub fn compile<A: StorageAdapter>(
    registry: Arc<SchemaRegistry>,
    controller: Arc<Controller<A>>,
    resolvers: &ResolverMap,
) -> Result<CompiledApi, ConfigError> {
    let mut builder = ShapeBuilder::new(&registry);
    builder.build_objects()?;

    let mut queries = BTreeMap::new();
    let mut mutations = BTreeMap::new();
    for class in registry.classes() {
        for op in class_operations(&mut builder, class, &controller)? {
            let target = if op.kind.is_mutation() { &mut mutations } else { &mut queries };
            target.insert(op.name.clone(), op);
        }
    }

    let mut custom = BTreeSet::new();
    let declared = registry
        .classes()
        .iter()
        .map(|c| (Some(c.name.as_str()), &c.resolvers))
        .chain(std::iter::once((None, registry.global_resolvers())));
    for (class, declarations) in declared {
        for config in &declarations.queries {
            let op = custom_operation(&mut builder, config, class, false, resolvers)?;
            claim(&mut custom, &op.name)?;
            mutations.remove(&op.name);
            queries.insert(op.name.clone(), op);
        }
        for config in &declarations.mutations {
            let op = custom_operation(&mut builder, config, class, true, resolvers)?;
            claim(&mut custom, &op.name)?;
            queries.remove(&op.name);
            mutations.insert(op.name.clone(), op);
        }
    }

    tracing::info!(
        shapes = builder.arena.shapes().len(),
        queries = queries.len(),
        mutations = mutations.len(),
        "api compiled"
    );
    let shapes = builder.arena;
    Ok(CompiledApi::new(registry.clone(), shapes, queries, mutations))
}

fn claim(names: &mut BTreeSet<String>, name: &str) -> Result<(), ConfigError> {
    if names.insert(name.to_string()) {
        Ok(())
    } else {
        Err(ConfigError::DuplicateName {
            kind: "resolver",
            name: name.to_string(),
        })
    }
}

fn input_shape(builder: &mut ShapeBuilder<'_>, name: String, fields: Vec<ShapeField>) -> Result<TypeRef, ConfigError> {
    let handle = builder.arena.push(Shape {
        name,
        kind: ShapeKind::Input,
        fields,
    })?;
    Ok(TypeRef::shape(handle).non_null())
}

/// Single `input` argument wrapping `fields` in a `<Class>[s]<Verb>Input` shape.
fn wrapper_args(
    builder: &mut ShapeBuilder<'_>,
    class: &str,
    verb: &str,
    many: bool,
    fields: Vec<ShapeField>,
) -> Result<Vec<ShapeField>, ConfigError> {
    let ty = input_shape(builder, mutation_input_name(class, verb, many), fields)?;
    Ok(vec![ShapeField::new("input", ty)])
}

fn class_operations<A: StorageAdapter>(
    builder: &mut ShapeBuilder<'_>,
    class: &ClassDefinition,
    controller: &Arc<Controller<A>>,
) -> Result<Vec<OperationDescriptor>, ConfigError> {
    let shapes = builder.object_shapes(class.object)?;
    let name = class.name.as_str();
    let id = || ShapeField::new(RESERVED_ID_FIELD, TypeRef::scalar(ID_SCALAR).non_null());
    let input = || ShapeField::new("fields", TypeRef::shape(shapes.input).non_null());
    let filter = || ShapeField::new("where", TypeRef::shape(shapes.filter));
    let offset = || ShapeField::new("offset", TypeRef::scalar("Int"));
    let limit = || ShapeField::new("limit", TypeRef::scalar("Int"));
    let one = TypeRef::shape(shapes.output);
    let many = TypeRef::shape(shapes.output).non_null().list().non_null();

    let mut ops = Vec::with_capacity(CrudKind::ALL.len());
    for kind in CrudKind::ALL {
        let args = match kind {
            CrudKind::FindOne => vec![id()],
            CrudKind::FindMany => vec![filter(), offset(), limit()],
            CrudKind::CreateOne => wrapper_args(builder, name, "Create", false, vec![input()])?,
            CrudKind::CreateMany => wrapper_args(
                builder,
                name,
                "Create",
                true,
                vec![
                    ShapeField::new("fields", TypeRef::shape(shapes.input).non_null().list().non_null()),
                    offset(),
                    limit(),
                ],
            )?,
            CrudKind::UpdateOne => wrapper_args(builder, name, "Update", false, vec![id(), input().patch()])?,
            CrudKind::UpdateMany => {
                wrapper_args(builder, name, "Update", true, vec![input().patch(), filter(), offset(), limit()])?
            }
            CrudKind::DeleteOne => wrapper_args(builder, name, "Delete", false, vec![id()])?,
            CrudKind::DeleteMany => wrapper_args(builder, name, "Delete", true, vec![filter()])?,
        };
        let output = match kind {
            CrudKind::FindOne => one.clone(),
            CrudKind::CreateOne | CrudKind::UpdateOne | CrudKind::DeleteOne => one.clone().non_null(),
            _ => many.clone(),
        };
        ops.push(OperationDescriptor {
            name: kind.operation_name(name),
            kind: OperationKind::Crud(kind),
            class_name: Some(name.to_string()),
            args,
            output,
            description: class.description.clone(),
            handler: Arc::new(CrudResolver::new(kind, name, controller.clone())),
        });
    }
    Ok(ops)
}

fn custom_operation(
    builder: &mut ShapeBuilder<'_>,
    config: &ResolverConfig,
    class: Option<&str>,
    mutation: bool,
    resolvers: &ResolverMap,
) -> Result<OperationDescriptor, ConfigError> {
    let implementations = if mutation { &resolvers.mutations } else { &resolvers.queries };
    let handler = implementations
        .get(&config.name)
        .cloned()
        .ok_or_else(|| ConfigError::MissingReference {
            kind: "resolver",
            id: config.name.clone(),
        })?;
    let mut fields = Vec::with_capacity(config.args.len());
    for arg in &config.args {
        let mut ty = builder.config_type(&arg.ty, true)?;
        if arg.required {
            ty = ty.non_null();
        }
        fields.push(ShapeField {
            description: arg.description.clone(),
            ..ShapeField::new(&arg.name, ty)
        });
    }
    let args = if mutation {
        let input = input_shape(builder, custom_input_name(&config.name), fields)?;
        vec![ShapeField::new("input", input)]
    } else {
        fields
    };
    let mut output = builder.config_type(&config.returns, false)?;
    if config.required {
        output = output.non_null();
    }
    Ok(OperationDescriptor {
        name: config.name.clone(),
        kind: if mutation {
            OperationKind::CustomMutation
        } else {
            OperationKind::CustomQuery
        },
        class_name: class.map(str::to_string),
        args,
        output,
        description: config.description.clone(),
        handler,
    })
}
