//! Field set parsing and traversal.
//!
//! A field set is the selection language used by `@key`, `@requires` and
//! `@provides`: a selection set with no root operation type, resolved against
//! a given parent type. Parsing reuses the operation parser rather than a
//! bespoke grammar, so nested selections and inline fragments on abstract
//! types come for free.

use apollo_compiler::executable;
use apollo_compiler::executable::FieldSet;
use apollo_compiler::schema::ExtendedType;
use apollo_compiler::validation::Valid;
use apollo_compiler::Name;
use apollo_compiler::Schema;

/// One field referenced by a field set, identified by the type that declares
/// it. Nested selections produce one use per level.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct FieldUse {
    pub(crate) type_name: Name,
    pub(crate) field_name: Name,
}

/// The result of resolving a field set against a schema. Missing fields are
/// collected rather than aborting the walk so validation can report all of
/// them in one pass.
#[derive(Debug, Default)]
pub(crate) struct FieldSetWalk {
    pub(crate) uses: Vec<FieldUse>,
    pub(crate) missing: Vec<FieldUse>,
}

/// Parses a `fields:` argument against `parent_type`. The schema is only used
/// to anchor the selection set; field existence is checked separately by the
/// walk so that each caller can attach its own error code.
pub(crate) fn parse(
    schema: &Schema,
    parent_type: &Name,
    source: &str,
) -> Result<FieldSet, String> {
    let field_set = FieldSet::parse(
        Valid::assume_valid_ref(schema),
        parent_type.clone(),
        source,
        "fields.graphql",
    )
    .map_err(|err| err.errors.to_string())?;

    for field in field_set.selection_set.fields() {
        if let Some(alias) = &field.alias {
            return Err(format!(
                r#"cannot use alias "{alias}" in "{source}": aliases are not supported in field sets"#
            ));
        }
    }
    if contains_fragment_spread(&field_set.selection_set) {
        return Err(format!(
            r#"cannot use a named fragment spread in "{source}""#
        ));
    }
    Ok(field_set)
}

fn contains_fragment_spread(selection_set: &executable::SelectionSet) -> bool {
    selection_set.selections.iter().any(|sel| match sel {
        executable::Selection::FragmentSpread(_) => true,
        executable::Selection::Field(field) => contains_fragment_spread(&field.selection_set),
        executable::Selection::InlineFragment(frag) => contains_fragment_spread(&frag.selection_set),
    })
}

/// Resolves every field referenced by `selection_set` against `schema`,
/// descending into sub-selections with the declared field types.
pub(crate) fn walk(schema: &Schema, parent_type: &Name, selection_set: &executable::SelectionSet) -> FieldSetWalk {
    let mut result = FieldSetWalk::default();
    walk_inner(schema, parent_type, selection_set, &mut result);
    result
}

fn walk_inner(
    schema: &Schema,
    parent_type: &Name,
    selection_set: &executable::SelectionSet,
    out: &mut FieldSetWalk,
) {
    for selection in &selection_set.selections {
        match selection {
            executable::Selection::Field(field) => {
                if field.name == "__typename" {
                    continue;
                }
                let use_ = FieldUse {
                    type_name: parent_type.clone(),
                    field_name: field.name.clone(),
                };
                match field_type(schema, parent_type, &field.name) {
                    Some(inner) => {
                        out.uses.push(use_);
                        if !field.selection_set.selections.is_empty() {
                            walk_inner(schema, &inner, &field.selection_set, out);
                        }
                    }
                    None => out.missing.push(use_),
                }
            }
            executable::Selection::InlineFragment(frag) => {
                let condition = frag
                    .type_condition
                    .as_ref()
                    .unwrap_or(parent_type)
                    .clone();
                walk_inner(schema, &condition, &frag.selection_set, out);
            }
            // Rejected at parse time; nothing to resolve here.
            executable::Selection::FragmentSpread(_) => {}
        }
    }
}

fn field_type(schema: &Schema, parent_type: &Name, field_name: &Name) -> Option<Name> {
    let fields = match schema.types.get(parent_type)? {
        ExtendedType::Object(object) => &object.fields,
        ExtendedType::Interface(interface) => &interface.fields,
        _ => return None,
    };
    fields
        .get(field_name)
        .map(|field| field.ty.inner_named_type().clone())
}

/// The compact canonical text of a selection set: `a b{c} ...on T{d}`. Used
/// for key comparison across subgraphs and as the `key:` argument in the
/// supergraph SDL.
pub(crate) fn canonical(selection_set: &executable::SelectionSet) -> String {
    let mut out = String::new();
    write_canonical(selection_set, &mut out);
    out
}

fn write_canonical(selection_set: &executable::SelectionSet, out: &mut String) {
    let mut first = true;
    for selection in &selection_set.selections {
        if !first {
            out.push(' ');
        }
        first = false;
        match selection {
            executable::Selection::Field(field) => {
                out.push_str(&field.name);
                if !field.selection_set.selections.is_empty() {
                    out.push('{');
                    write_canonical(&field.selection_set, out);
                    out.push('}');
                }
            }
            executable::Selection::InlineFragment(frag) => {
                out.push_str("...");
                if let Some(condition) = &frag.type_condition {
                    out.push_str("on ");
                    out.push_str(condition);
                }
                out.push('{');
                write_canonical(&frag.selection_set, out);
                out.push('}');
            }
            executable::Selection::FragmentSpread(_) => {}
        }
    }
}

/// Number of fields selected, at any depth. Smaller keys make smaller entity
/// representations, so the planner prefers them.
pub(crate) fn field_count(selection_set: &executable::SelectionSet) -> usize {
    selection_set
        .selections
        .iter()
        .map(|selection| match selection {
            executable::Selection::Field(field) => 1 + field_count(&field.selection_set),
            executable::Selection::InlineFragment(frag) => field_count(&frag.selection_set),
            executable::Selection::FragmentSpread(_) => 0,
        })
        .sum()
}
