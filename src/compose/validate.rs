//! Post-composition validation. Every pass runs against the merged schema so
//! cross-subgraph inconsistencies are observable; errors accumulate rather
//! than short-circuiting.

use apollo_compiler::collections::IndexSet;
use apollo_compiler::schema::ExtendedType;
use apollo_compiler::Name;
use apollo_compiler::Schema;

use crate::error::CompositionError;
use crate::error::CompositionErrors;
use crate::fieldset;
use crate::fieldset::FieldUse;
use crate::subgraph::Subgraph;
use crate::supergraph::JoinMetadata;

pub(super) fn run(
    schema: &Schema,
    metadata: &JoinMetadata,
    subgraphs: &[&Subgraph],
    errors: &mut CompositionErrors,
) {
    for subgraph in subgraphs {
        external_unused(subgraph, errors);
        external_against_owner(subgraph, metadata, subgraphs, errors);
        key_fields(subgraph, schema, errors);
        provides_fields(subgraph, schema, metadata, errors);
        requires_fields(subgraph, errors);
    }
}

/// `EXTERNAL_UNUSED`: every `@external` field must be referenced by a key,
/// requires, or provides in the same subgraph, otherwise it is dead weight.
fn external_unused(subgraph: &Subgraph, errors: &mut CompositionErrors) {
    let mut used: IndexSet<FieldUse> = IndexSet::default();
    for (type_name, keys) in &subgraph.metadata.keys {
        for key in keys {
            let walk = fieldset::walk(&subgraph.schema, type_name, &key.selection_set);
            used.extend(walk.uses);
        }
    }
    for ((type_name, _), decl) in &subgraph.metadata.requires {
        let walk = fieldset::walk(&subgraph.schema, type_name, &decl.selection_set);
        used.extend(walk.uses);
    }
    for ((type_name, field_name), decl) in &subgraph.metadata.provides {
        let Some(target) = field_return_type(&subgraph.schema, type_name, field_name) else {
            continue;
        };
        let walk = fieldset::walk(&subgraph.schema, &target, &decl.selection_set);
        used.extend(walk.uses);
    }

    for ((type_name, field_name), location) in &subgraph.metadata.external {
        let coord = FieldUse {
            type_name: type_name.clone(),
            field_name: field_name.clone(),
        };
        if !used.contains(&coord) {
            errors.push(CompositionError::ExternalUnused {
                subgraph: subgraph.name.clone(),
                message: format!(
                    "field \"{type_name}.{field_name}\" is marked @external but never used by a @key, @requires or @provides in this subgraph"
                ),
                locations: location.iter().copied().collect(),
            });
        }
    }
}

/// `EXTERNAL_MISSING_ON_BASE` and `EXTERNAL_TYPE_MISMATCH`: an `@external`
/// field is a stub of the owner's declaration and must match it.
fn external_against_owner(
    subgraph: &Subgraph,
    metadata: &JoinMetadata,
    subgraphs: &[&Subgraph],
    errors: &mut CompositionErrors,
) {
    for ((type_name, field_name), location) in &subgraph.metadata.external {
        let Some(owner) = metadata.types.get(type_name).and_then(|join| join.owner) else {
            continue;
        };
        let owner_subgraph = subgraphs[owner.0 as usize];
        if owner_subgraph.name == subgraph.name {
            continue;
        }
        let Some(owner_field) = field_definition(&owner_subgraph.schema, type_name, field_name)
        else {
            errors.push(CompositionError::ExternalMissingOnBase {
                subgraph: subgraph.name.clone(),
                message: format!(
                    "@external field \"{type_name}.{field_name}\" is not defined by the owning subgraph \"{}\"",
                    owner_subgraph.name
                ),
                locations: location.iter().copied().collect(),
            });
            continue;
        };
        let Some(local_field) = field_definition(&subgraph.schema, type_name, field_name) else {
            continue;
        };
        if local_field.ty != owner_field.ty {
            errors.push(CompositionError::ExternalTypeMismatch {
                subgraph: subgraph.name.clone(),
                message: format!(
                    "@external field \"{type_name}.{field_name}\" is declared as {} here but as {} by the owning subgraph \"{}\"",
                    local_field.ty, owner_field.ty, owner_subgraph.name
                ),
                locations: location.iter().copied().collect(),
            });
        }
    }
}

/// `KEY_FIELDS_MISSING_ON_BASE` and `KEY_FIELDS_SELECT_INVALID_TYPE`: key
/// fields must exist after composition and must be usable as identity
/// components (no lists, interfaces or unions).
fn key_fields(subgraph: &Subgraph, schema: &Schema, errors: &mut CompositionErrors) {
    for (type_name, keys) in &subgraph.metadata.keys {
        for key in keys {
            let walk = fieldset::walk(schema, type_name, &key.selection_set);
            for missing in &walk.missing {
                errors.push(CompositionError::KeyFieldsMissingOnBase {
                    subgraph: subgraph.name.clone(),
                    message: format!(
                        "@key(fields: {:?}) on \"{type_name}\" selects \"{}.{}\", which is not defined after composition",
                        key.source, missing.type_name, missing.field_name
                    ),
                    locations: key.location.into_iter().collect(),
                });
            }
            for use_ in &walk.uses {
                let Some(field) = field_definition(schema, &use_.type_name, &use_.field_name)
                else {
                    continue;
                };
                let invalid = if field.ty.is_list() {
                    Some("a list")
                } else {
                    match schema.types.get(field.ty.inner_named_type()) {
                        Some(ExtendedType::Interface(_)) => Some("an interface"),
                        Some(ExtendedType::Union(_)) => Some("a union"),
                        _ => None,
                    }
                };
                if let Some(what) = invalid {
                    errors.push(CompositionError::KeyFieldsSelectInvalidType {
                        subgraph: subgraph.name.clone(),
                        message: format!(
                            "@key(fields: {:?}) on \"{type_name}\" selects \"{}.{}\" of type {}, which is {what} and cannot be part of a key",
                            key.source, use_.type_name, use_.field_name, field.ty
                        ),
                        locations: key.location.into_iter().collect(),
                    });
                }
            }
        }
    }
}

/// `PROVIDES_NOT_ON_ENTITY` and `PROVIDES_FIELDS_MISSING_EXTERNAL`.
fn provides_fields(
    subgraph: &Subgraph,
    schema: &Schema,
    metadata: &JoinMetadata,
    errors: &mut CompositionErrors,
) {
    for ((type_name, field_name), decl) in &subgraph.metadata.provides {
        let Some(target) = field_return_type(schema, type_name, field_name)
            .or_else(|| field_return_type(&subgraph.schema, type_name, field_name))
        else {
            continue;
        };
        if !metadata.is_entity(&target) {
            errors.push(CompositionError::ProvidesNotOnEntity {
                subgraph: subgraph.name.clone(),
                message: format!(
                    "@provides on \"{type_name}.{field_name}\": return type \"{target}\" is not an entity"
                ),
                locations: decl.location.into_iter().collect(),
            });
            continue;
        }
        let walk = fieldset::walk(&subgraph.schema, &target, &decl.selection_set);
        for use_ in walk.uses.iter().chain(&walk.missing) {
            // Nested value-type fields ride along with their parent; only
            // fields of the entity itself need the @external stub.
            if use_.type_name != target {
                continue;
            }
            let coord = (use_.type_name.clone(), use_.field_name.clone());
            if !subgraph.metadata.external.contains_key(&coord) {
                errors.push(CompositionError::ProvidesFieldsMissingExternal {
                    subgraph: subgraph.name.clone(),
                    message: format!(
                        "@provides(fields: {:?}) on \"{type_name}.{field_name}\" references \"{}.{}\", which is not marked @external in this subgraph",
                        decl.source, use_.type_name, use_.field_name
                    ),
                    locations: decl.location.into_iter().collect(),
                });
            }
        }
    }
}

/// `REQUIRES_FIELDS_MISSING_EXTERNAL`.
fn requires_fields(subgraph: &Subgraph, errors: &mut CompositionErrors) {
    for ((type_name, field_name), decl) in &subgraph.metadata.requires {
        let walk = fieldset::walk(&subgraph.schema, type_name, &decl.selection_set);
        for use_ in walk.uses.iter().chain(&walk.missing) {
            if use_.type_name != *type_name {
                continue;
            }
            let coord = (use_.type_name.clone(), use_.field_name.clone());
            if !subgraph.metadata.external.contains_key(&coord) {
                errors.push(CompositionError::RequiresFieldsMissingExternal {
                    subgraph: subgraph.name.clone(),
                    message: format!(
                        "@requires(fields: {:?}) on \"{type_name}.{field_name}\" references \"{}.{}\", which is not marked @external in this subgraph",
                        decl.source, use_.type_name, use_.field_name
                    ),
                    locations: decl.location.into_iter().collect(),
                });
            }
        }
    }
}

fn field_definition<'a>(
    schema: &'a Schema,
    type_name: &Name,
    field_name: &Name,
) -> Option<&'a apollo_compiler::ast::FieldDefinition> {
    let fields = match schema.types.get(type_name)? {
        ExtendedType::Object(object) => &object.fields,
        ExtendedType::Interface(interface) => &interface.fields,
        _ => return None,
    };
    fields.get(field_name).map(|component| &***component)
}

fn field_return_type(schema: &Schema, type_name: &Name, field_name: &Name) -> Option<Name> {
    field_definition(schema, type_name, field_name).map(|field| field.ty.inner_named_type().clone())
}
