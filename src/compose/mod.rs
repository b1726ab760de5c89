//! Composition: merging per-subgraph type models into a single supergraph
//! schema and recording the routing decisions as join metadata.
//!
//! Merging never stops at the first problem. Conflicting declarations fall
//! back to the first contributor so that the post-merge validation passes can
//! still observe the rest of the schema, and every error is aggregated into
//! one report.

use apollo_compiler::ast;
use apollo_compiler::collections::IndexMap;
use apollo_compiler::collections::IndexSet;
use apollo_compiler::schema::ExtendedType;
use apollo_compiler::Name;
use apollo_compiler::Schema;
use itertools::Itertools;

use crate::error::CompositionError;
use crate::error::CompositionErrors;
use crate::subgraph::Subgraph;
use crate::supergraph::FieldJoin;
use crate::supergraph::GraphId;
use crate::supergraph::JoinGraph;
use crate::supergraph::JoinMetadata;
use crate::supergraph::Supergraph;
use crate::supergraph::TypeJoin;

mod validate;

/// How a merged type participates in routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TypeRole {
    /// Query/Mutation/Subscription: every subgraph contributes fields and
    /// owns the ones it declares.
    Root,
    /// Declared non-extended by exactly one subgraph, with at least one
    /// `@key` somewhere.
    Entity { owner: GraphId },
    /// Shared by identity of shape; resolvable wherever it appears.
    Value,
}

/// One subgraph's declaration of a type.
struct TypeDecl<'a> {
    graph: GraphId,
    subgraph: &'a Subgraph,
    ty: &'a ExtendedType,
    is_extension: bool,
}

/// Merges the given subgraphs into a supergraph, or reports the full list of
/// composition errors.
pub fn compose(subgraphs: &[Subgraph]) -> Result<Supergraph, CompositionErrors> {
    let mut errors = CompositionErrors::default();

    check_subgraph_names(subgraphs, &mut errors);

    // The graph table is sorted by subgraph name; all later iteration happens
    // in graph-table order so composition is deterministic.
    let ordered: Vec<&Subgraph> = subgraphs
        .iter()
        .sorted_by(|a, b| a.name.cmp(&b.name))
        .collect();
    let graphs = graph_table(&ordered);
    tracing::debug!(
        subgraphs = ordered.len(),
        "composing supergraph"
    );

    let declarations = collect_declarations(&ordered);
    let roots = root_type_names(&ordered, &mut errors);

    let mut schema = Schema::new();
    if let Some(query) = &roots.query {
        schema.schema_definition.make_mut().query = Some(query.clone().into());
    }
    if let Some(mutation) = &roots.mutation {
        schema.schema_definition.make_mut().mutation = Some(mutation.clone().into());
    }
    if let Some(subscription) = &roots.subscription {
        schema.schema_definition.make_mut().subscription =
            Some(subscription.clone().into());
    }

    let mut metadata = JoinMetadata {
        graphs,
        ..Default::default()
    };

    for (type_name, decls) in &declarations {
        let role = classify(type_name, decls, &roots, &mut errors);
        merge_type(type_name, decls, role, &mut schema, &mut metadata, &mut errors);
    }

    validate::run(&schema, &metadata, &ordered, &mut errors);

    if errors.is_empty() {
        tracing::debug!(
            types = metadata.types.len(),
            fields = metadata.fields.len(),
            "composition succeeded"
        );
        Ok(Supergraph { schema, metadata })
    } else {
        tracing::debug!(errors = errors.len(), "composition failed");
        Err(errors)
    }
}

fn check_subgraph_names(subgraphs: &[Subgraph], errors: &mut CompositionErrors) {
    let mut seen: IndexSet<&str> = IndexSet::default();
    for subgraph in subgraphs {
        if subgraph.name.is_empty() {
            errors.push(CompositionError::DuplicateSubgraphName {
                message: "subgraph names must be non-empty".to_owned(),
            });
        } else if !seen.insert(subgraph.name.as_str()) {
            errors.push(CompositionError::DuplicateSubgraphName {
                message: format!("a subgraph named \"{}\" already exists", subgraph.name),
            });
        }
    }
}

fn graph_table(ordered: &[&Subgraph]) -> Vec<JoinGraph> {
    let mut used: IndexSet<String> = IndexSet::default();
    ordered
        .iter()
        .map(|subgraph| {
            let mut value = graph_enum_value(&subgraph.name);
            let mut n = 1usize;
            while !used.insert(value.clone()) {
                n += 1;
                value = format!("{}_{n}", graph_enum_value(&subgraph.name));
            }
            JoinGraph {
                // graph_enum_value only emits `[A-Z0-9_]` starting with a
                // non-digit, so this cannot fail.
                enum_value: Name::new(&value).expect("generated enum value is a valid name"),
                name: subgraph.name.clone(),
                url: subgraph.url.clone(),
            }
        })
        .collect()
}

/// Stable identifier for a subgraph inside the supergraph SDL.
fn graph_enum_value(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push('_');
        }
    }
    if out.chars().next().is_none_or(|c| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

fn collect_declarations<'a>(ordered: &[&'a Subgraph]) -> IndexMap<Name, Vec<TypeDecl<'a>>> {
    let mut declarations: IndexMap<Name, Vec<TypeDecl<'a>>> = IndexMap::default();
    for (index, subgraph) in ordered.iter().enumerate() {
        let graph = GraphId(index as u16);
        for (type_name, ty) in &subgraph.schema.types {
            if ty.is_built_in() || type_name.starts_with("__") {
                continue;
            }
            declarations.entry(type_name.clone()).or_default().push(TypeDecl {
                graph,
                subgraph,
                ty,
                is_extension: subgraph.metadata.extensions.contains(type_name),
            });
        }
    }
    declarations
}

struct RootNames {
    query: Option<Name>,
    mutation: Option<Name>,
    subscription: Option<Name>,
}

impl RootNames {
    fn contains(&self, name: &Name) -> bool {
        [&self.query, &self.mutation, &self.subscription]
            .into_iter()
            .flatten()
            .any(|root| root == name)
    }
}

fn root_type_names(ordered: &[&Subgraph], errors: &mut CompositionErrors) -> RootNames {
    let mut roots = RootNames {
        query: None,
        mutation: None,
        subscription: None,
    };
    for subgraph in ordered {
        let definition = &subgraph.schema.schema_definition;
        for (slot, declared) in [
            (&mut roots.query, &definition.query),
            (&mut roots.mutation, &definition.mutation),
            (&mut roots.subscription, &definition.subscription),
        ] {
            let Some(declared) = declared else { continue };
            match slot {
                None => *slot = Some(declared.name.clone()),
                Some(existing) if *existing != declared.name => {
                    errors.push(CompositionError::Internal {
                        message: format!(
                            "subgraphs disagree on a root operation type: {existing} vs {} in \"{}\"",
                            declared.name, subgraph.name
                        ),
                    });
                }
                Some(_) => {}
            }
        }
    }
    roots
}

fn classify(
    type_name: &Name,
    decls: &[TypeDecl<'_>],
    roots: &RootNames,
    errors: &mut CompositionErrors,
) -> TypeRole {
    if roots.contains(type_name) {
        return TypeRole::Root;
    }

    let bases: Vec<&TypeDecl> = decls.iter().filter(|d| !d.is_extension).collect();
    let keyed: Vec<&TypeDecl> = decls
        .iter()
        .filter(|d| d.subgraph.metadata.has_key(type_name))
        .collect();

    if bases.is_empty() {
        for decl in decls {
            errors.push(CompositionError::ExtensionWithNoBase {
                subgraph: decl.subgraph.name.clone(),
                message: format!(
                    "type \"{type_name}\" is an extension type, but no subgraph defines it"
                ),
            });
        }
        return TypeRole::Value;
    }

    if keyed.is_empty() {
        // A keyless shared type is a value type; extending one is a mistake
        // because there is no identity to join on.
        for decl in decls.iter().filter(|d| d.is_extension) {
            errors.push(CompositionError::KeyMissingOnExtension {
                subgraph: decl.subgraph.name.clone(),
                message: format!(
                    "\"{type_name}\" is extended in subgraph \"{}\" but declares no @key there",
                    decl.subgraph.name
                ),
                locations: Vec::new(),
            });
        }
        return TypeRole::Value;
    }

    if bases.len() > 1 {
        let base_keys: Vec<&TypeDecl> = bases
            .iter()
            .filter(|d| d.subgraph.metadata.has_key(type_name))
            .copied()
            .collect();
        let names = bases.iter().map(|d| d.subgraph.name.as_str()).join(", ");
        if base_keys.len() == bases.len() {
            errors.push(CompositionError::EntityOwnershipConflict {
                message: format!(
                    "entity \"{type_name}\" is declared (without extends) in multiple subgraphs: {names}"
                ),
            });
        } else {
            errors.push(CompositionError::ValueTypeNoEntity {
                message: format!(
                    "\"{type_name}\" is shared as a value type across {names} but carries @key; value types cannot be entities"
                ),
            });
        }
        // Keep composing with the first base as a provisional owner.
        return TypeRole::Entity {
            owner: bases[0].graph,
        };
    }

    let owner = bases[0];
    if !owner.subgraph.metadata.has_key(type_name) {
        // Extensions join on keys the owner never declared.
        for decl in &keyed {
            errors.push(CompositionError::KeyMissingOnBase {
                subgraph: decl.subgraph.name.clone(),
                message: format!(
                    "\"{type_name}\" has a @key in subgraph \"{}\" but its owning subgraph \"{}\" declares none",
                    decl.subgraph.name, owner.subgraph.name
                ),
                locations: Vec::new(),
            });
        }
    }
    for decl in decls.iter().filter(|d| d.is_extension) {
        if !decl.subgraph.metadata.has_key(type_name) {
            errors.push(CompositionError::KeyMissingOnExtension {
                subgraph: decl.subgraph.name.clone(),
                message: format!(
                    "extension of entity \"{type_name}\" in subgraph \"{}\" declares no @key",
                    decl.subgraph.name
                ),
                locations: Vec::new(),
            });
        }
    }

    TypeRole::Entity { owner: owner.graph }
}

fn merge_type(
    type_name: &Name,
    decls: &[TypeDecl<'_>],
    role: TypeRole,
    schema: &mut Schema,
    metadata: &mut JoinMetadata,
    errors: &mut CompositionErrors,
) {
    let first = &decls[0];
    let kind_mismatch = decls
        .iter()
        .any(|d| std::mem::discriminant(d.ty) != std::mem::discriminant(first.ty));
    if kind_mismatch {
        let kinds = decls
            .iter()
            .map(|d| format!("{} in \"{}\"", kind_name(d.ty), d.subgraph.name))
            .join(", ");
        errors.push(CompositionError::ValueTypeKindMismatch {
            message: format!("\"{type_name}\" is declared with mismatched kinds: {kinds}"),
        });
    }
    let agreeing: Vec<&TypeDecl> = decls
        .iter()
        .filter(|d| std::mem::discriminant(d.ty) == std::mem::discriminant(first.ty))
        .collect();

    match first.ty {
        ExtendedType::Object(_) | ExtendedType::Interface(_) => {
            merge_composite(type_name, &agreeing, role, schema, metadata, errors);
        }
        ExtendedType::Union(first_union) => {
            for decl in &agreeing[1..] {
                let ExtendedType::Union(other) = decl.ty else { continue };
                let first_members: IndexSet<&str> =
                    first_union.members.iter().map(|m| m.name.as_str()).collect();
                let other_members: IndexSet<&str> =
                    other.members.iter().map(|m| m.name.as_str()).collect();
                if first_members != other_members {
                    errors.push(CompositionError::ValueTypeUnionTypesMismatch {
                        message: format!(
                            "union \"{type_name}\" has mismatched members across subgraphs: [{}] in \"{}\" vs [{}] in \"{}\"",
                            first_members.iter().join(", "),
                            first.subgraph.name,
                            other_members.iter().join(", "),
                            decl.subgraph.name
                        ),
                    });
                }
            }
            let mut merged = first.ty.clone();
            normalize_component_origins(&mut merged);
            schema.types.insert(type_name.clone(), merged);
        }
        ExtendedType::Enum(_) => {
            // Enum values union together; the first declaration's directives
            // win.
            let mut merged = first.ty.clone();
            if let ExtendedType::Enum(enum_type) = &mut merged {
                let enum_type = enum_type.make_mut();
                for decl in &agreeing[1..] {
                    let ExtendedType::Enum(other) = decl.ty else { continue };
                    for (value_name, value) in &other.values {
                        enum_type
                            .values
                            .entry(value_name.clone())
                            .or_insert_with(|| value.clone());
                    }
                }
            }
            normalize_component_origins(&mut merged);
            schema.types.insert(type_name.clone(), merged);
        }
        ExtendedType::Scalar(_) => {
            let mut merged = first.ty.clone();
            normalize_component_origins(&mut merged);
            schema.types.insert(type_name.clone(), merged);
        }
        ExtendedType::InputObject(_) => {
            let mut merged = first.ty.clone();
            if let ExtendedType::InputObject(input) = &mut merged {
                let input = input.make_mut();
                for decl in &agreeing[1..] {
                    let ExtendedType::InputObject(other) = decl.ty else { continue };
                    for (field_name, field) in &other.fields {
                        match input.fields.get(field_name) {
                            None => {
                                input.fields.insert(field_name.clone(), field.clone());
                            }
                            Some(existing)
                                if existing.ty != field.ty
                                    || existing.default_value != field.default_value =>
                            {
                                errors.push(CompositionError::ValueTypeFieldTypeMismatch {
                                    message: format!(
                                        "input field \"{type_name}.{field_name}\" has mismatched definitions between \"{}\" and \"{}\"",
                                        first.subgraph.name, decl.subgraph.name
                                    ),
                                });
                            }
                            Some(_) => {}
                        }
                    }
                }
            }
            normalize_component_origins(&mut merged);
            schema.types.insert(type_name.clone(), merged);
        }
    }
}

/// Rebuilds every component of a merged type with a plain definition origin.
/// Cloned subgraph types can carry extension origins, which would serialize
/// as `extend type` blocks in the supergraph SDL.
fn normalize_component_origins(ty: &mut ExtendedType) {
    use apollo_compiler::schema::Component;
    use apollo_compiler::schema::ComponentName;

    fn fresh_directives(
        directives: &apollo_compiler::schema::DirectiveList,
    ) -> apollo_compiler::schema::DirectiveList {
        let mut out = apollo_compiler::schema::DirectiveList::default();
        for directive in directives.iter() {
            out.push(Component::from((**directive).clone()));
        }
        out
    }

    fn fresh_names(
        names: &IndexSet<ComponentName>,
    ) -> IndexSet<ComponentName> {
        names
            .iter()
            .map(|component| ComponentName::from(component.name.clone()))
            .collect()
    }

    match ty {
        ExtendedType::Object(object) => {
            let object = object.make_mut();
            object.directives = fresh_directives(&object.directives);
            object.implements_interfaces = fresh_names(&object.implements_interfaces);
            for field in object.fields.values_mut() {
                *field = Component::from((**field).clone());
            }
        }
        ExtendedType::Interface(interface) => {
            let interface = interface.make_mut();
            interface.directives = fresh_directives(&interface.directives);
            interface.implements_interfaces = fresh_names(&interface.implements_interfaces);
            for field in interface.fields.values_mut() {
                *field = Component::from((**field).clone());
            }
        }
        ExtendedType::Union(union_) => {
            let union_ = union_.make_mut();
            union_.directives = fresh_directives(&union_.directives);
            union_.members = fresh_names(&union_.members);
        }
        ExtendedType::Enum(enum_) => {
            let enum_ = enum_.make_mut();
            enum_.directives = fresh_directives(&enum_.directives);
            for value in enum_.values.values_mut() {
                *value = Component::from((**value).clone());
            }
        }
        ExtendedType::Scalar(scalar) => {
            let scalar = scalar.make_mut();
            scalar.directives = fresh_directives(&scalar.directives);
        }
        ExtendedType::InputObject(input) => {
            let input = input.make_mut();
            input.directives = fresh_directives(&input.directives);
            for field in input.fields.values_mut() {
                *field = Component::from((**field).clone());
            }
        }
    }
}

fn kind_name(ty: &ExtendedType) -> &'static str {
    match ty {
        ExtendedType::Scalar(_) => "scalar",
        ExtendedType::Object(_) => "object",
        ExtendedType::Interface(_) => "interface",
        ExtendedType::Union(_) => "union",
        ExtendedType::Enum(_) => "enum",
        ExtendedType::InputObject(_) => "input object",
    }
}

fn merge_composite(
    type_name: &Name,
    decls: &[&TypeDecl<'_>],
    role: TypeRole,
    schema: &mut Schema,
    metadata: &mut JoinMetadata,
    errors: &mut CompositionErrors,
) {
    // Base declarations contribute fields before extensions, each in
    // graph-table order.
    let ordered_decls: Vec<&&TypeDecl> = decls
        .iter()
        .sorted_by_key(|d| (d.is_extension, d.graph))
        .collect();

    let mut merged = (*ordered_decls[0]).ty.clone();
    {
        let fields = match &mut merged {
            ExtendedType::Object(object) => {
                let object = object.make_mut();
                object.fields.clear();
                &mut object.fields
            }
            ExtendedType::Interface(interface) => {
                let interface = interface.make_mut();
                interface.fields.clear();
                &mut interface.fields
            }
            _ => unreachable!("merge_composite is only called for objects and interfaces"),
        };

        let mut field_owner: IndexMap<Name, GraphId> = IndexMap::default();
        for decl in &ordered_decls {
            let decl_fields = match decl.ty {
                ExtendedType::Object(object) => &object.fields,
                ExtendedType::Interface(interface) => &interface.fields,
                _ => continue,
            };
            for (field_name, field) in decl_fields {
                let coord = (type_name.clone(), field_name.clone());
                if decl.subgraph.metadata.external.contains_key(&coord) {
                    // External fields are stubs of the owner's declaration;
                    // they are consumed by the side table, never re-emitted.
                    continue;
                }
                match field_owner.get(field_name) {
                    None => {
                        field_owner.insert(field_name.clone(), decl.graph);
                        fields.insert(field_name.clone(), field.clone());
                        record_field_join(&coord, decl, role, metadata);
                    }
                    Some(previous) => {
                        let previous_subgraph = metadata.graph(*previous).name.clone();
                        match role {
                            TypeRole::Root | TypeRole::Entity { .. } => {
                                errors.push(CompositionError::FieldOwnershipConflict {
                                    message: format!(
                                        "field \"{type_name}.{field_name}\" is declared (non-externally) in both \"{previous_subgraph}\" and \"{}\"",
                                        decl.subgraph.name
                                    ),
                                });
                            }
                            TypeRole::Value => {
                                let existing = fields.get(field_name).expect("inserted above");
                                if !same_field_shape(existing, field) {
                                    errors.push(CompositionError::ValueTypeFieldTypeMismatch {
                                        message: format!(
                                            "value type field \"{type_name}.{field_name}\" has mismatched definitions between \"{previous_subgraph}\" and \"{}\"",
                                            decl.subgraph.name
                                        ),
                                    });
                                }
                            }
                        }
                    }
                }
            }
        }

        // Fields every contributor marked external never made it into the
        // merged type; validation reports them against the owner.
    }
    normalize_component_origins(&mut merged);
    schema.types.insert(type_name.clone(), merged);

    if let TypeRole::Entity { owner } = role {
        let mut join = TypeJoin {
            owner: Some(owner),
            keys: Vec::new(),
        };
        for decl in &ordered_decls {
            if let Some(keys) = decl.subgraph.metadata.keys.get(type_name) {
                for key in keys {
                    join.keys.push((decl.graph, key.canonical.clone()));
                }
            }
        }
        metadata.types.insert(type_name.clone(), join);
    }
}

/// Records which subgraph resolves a field, when that is not implied by the
/// type's owner.
fn record_field_join(
    coord: &(Name, Name),
    decl: &TypeDecl<'_>,
    role: TypeRole,
    metadata: &mut JoinMetadata,
) {
    let requires = decl
        .subgraph
        .metadata
        .requires
        .get(coord)
        .map(|d| d.canonical.clone());
    let provides = decl
        .subgraph
        .metadata
        .provides
        .get(coord)
        .map(|d| d.canonical.clone());
    let differs_from_owner = match role {
        TypeRole::Root => true,
        TypeRole::Entity { owner } => decl.graph != owner,
        TypeRole::Value => false,
    };
    if differs_from_owner || requires.is_some() || provides.is_some() {
        metadata.fields.insert(
            coord.clone(),
            FieldJoin {
                graph: decl.graph,
                requires,
                provides,
            },
        );
    }
}

fn same_field_shape(a: &ast::FieldDefinition, b: &ast::FieldDefinition) -> bool {
    if a.ty != b.ty || a.arguments.len() != b.arguments.len() {
        return false;
    }
    a.arguments.iter().all(|arg| {
        b.arguments
            .iter()
            .find(|other| other.name == arg.name)
            .is_some_and(|other| other.ty == arg.ty && other.default_value == arg.default_value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graph_enum_values_are_stable_identifiers() {
        assert_eq!(graph_enum_value("accounts"), "ACCOUNTS");
        assert_eq!(graph_enum_value("product-service"), "PRODUCT_SERVICE");
        assert_eq!(graph_enum_value("7eleven"), "_7ELEVEN");
    }
}
