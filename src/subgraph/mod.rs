//! Schema ingest and normalization.
//!
//! Each subgraph SDL document is parsed once as a raw AST (to observe
//! `extend type` syntax and directive locations) and once into a normalized
//! [`Schema`]. The federation directive set is recorded in a side table keyed
//! by type and field, then stripped from the stored schema so downstream
//! consumers only ever see plain GraphQL.

use std::fmt::Formatter;

use apollo_compiler::ast;
use apollo_compiler::ast::Definition;
use apollo_compiler::collections::IndexMap;
use apollo_compiler::collections::IndexSet;
use apollo_compiler::executable;
use apollo_compiler::parser::SourceMap;
use apollo_compiler::schema::ExtendedType;
use apollo_compiler::schema::SchemaBuilder;
use apollo_compiler::Name;
use apollo_compiler::Node;
use apollo_compiler::Schema;

use crate::error::CompositionError;
use crate::error::CompositionErrors;
use crate::error::Location;
use crate::fieldset;
use crate::subgraph::spec::is_built_in_directive;
use crate::subgraph::spec::is_federation_directive;
use crate::subgraph::spec::EXTENDS_DIRECTIVE_NAME;
use crate::subgraph::spec::EXTERNAL_DIRECTIVE_NAME;
use crate::subgraph::spec::FIELDS_ARGUMENT_NAME;
use crate::subgraph::spec::KEY_DIRECTIVE_NAME;
use crate::subgraph::spec::PROVIDES_DIRECTIVE_NAME;
use crate::subgraph::spec::REQUIRES_DIRECTIVE_NAME;

pub mod spec;

/// A field identified by the type declaring it.
pub(crate) type FieldCoord = (Name, Name);

/// A parsed `fields:` argument, kept with its source text so errors and the
/// supergraph SDL can echo what the user wrote.
#[derive(Debug, Clone)]
pub(crate) struct FieldSetDecl {
    pub(crate) source: String,
    pub(crate) canonical: String,
    pub(crate) selection_set: executable::SelectionSet,
    pub(crate) location: Option<Location>,
}

/// The federation side table for one subgraph.
#[derive(Debug, Default, Clone)]
pub(crate) struct SubgraphMetadata {
    /// `@key` declarations per object type, in declaration order.
    pub(crate) keys: IndexMap<Name, Vec<FieldSetDecl>>,
    /// Types declared with `extend type` or `@extends`.
    pub(crate) extensions: IndexSet<Name>,
    /// `@external` fields.
    pub(crate) external: IndexMap<FieldCoord, Option<Location>>,
    /// `@requires` per field.
    pub(crate) requires: IndexMap<FieldCoord, FieldSetDecl>,
    /// `@provides` per field.
    pub(crate) provides: IndexMap<FieldCoord, FieldSetDecl>,
}

impl SubgraphMetadata {
    pub(crate) fn has_key(&self, type_name: &Name) -> bool {
        self.keys.get(type_name).is_some_and(|keys| !keys.is_empty())
    }
}

/// An independent GraphQL service contributing a slice of the overall schema.
pub struct Subgraph {
    pub name: String,
    pub url: String,
    /// The normalized schema with federation directives stripped.
    pub schema: Schema,
    pub(crate) metadata: SubgraphMetadata,
}

impl std::fmt::Debug for Subgraph {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "name: {}, url: {}", self.name, self.url)
    }
}

/// A raw directive occurrence captured from the AST before the schema is
/// available to resolve its field set against.
struct RawFieldSet {
    type_name: Name,
    field_name: Option<Name>,
    directive_name: &'static str,
    source: Option<String>,
    location: Option<Location>,
}

impl Subgraph {
    /// Parses and normalizes one subgraph schema. All ingest errors are
    /// aggregated; a subgraph is only returned when it is clean.
    pub fn parse(name: &str, url: &str, sdl: &str) -> Result<Self, CompositionErrors> {
        let mut errors = CompositionErrors::default();

        let document = match ast::Document::parse(sdl, name) {
            Ok(document) => document,
            Err(with_errors) => {
                errors.push(CompositionError::InvalidGraphQL {
                    subgraph: name.to_owned(),
                    message: with_errors.errors.to_string(),
                });
                with_errors.partial
            }
        };

        let mut schema = match SchemaBuilder::new()
            .adopt_orphan_extensions()
            .parse(sdl, name)
            .build()
        {
            Ok(schema) => schema,
            Err(with_errors) => {
                errors.push(CompositionError::InvalidGraphQL {
                    subgraph: name.to_owned(),
                    message: with_errors.errors.to_string(),
                });
                with_errors.partial
            }
        };

        let mut metadata = SubgraphMetadata::default();
        let mut raw_field_sets = Vec::new();
        scrape_document(
            name,
            &document,
            &mut metadata,
            &mut raw_field_sets,
            &mut errors,
        );
        check_unknown_directives(name, &document, &mut errors);

        resolve_field_sets(name, &schema, raw_field_sets, &mut metadata, &mut errors);
        check_requires_placement(name, &metadata, &mut errors);
        check_provides_placement(name, &schema, &metadata, &mut errors);

        strip_federation_directives(&mut schema);

        if errors.is_empty() {
            Ok(Subgraph {
                name: name.to_owned(),
                url: url.to_owned(),
                schema,
                metadata,
            })
        } else {
            Err(errors)
        }
    }
}

fn location_of(node: &Node<ast::Directive>, sources: &SourceMap) -> Option<Location> {
    Location::from_range(node.line_column_range(sources))
}

fn scrape_document(
    subgraph: &str,
    document: &ast::Document,
    metadata: &mut SubgraphMetadata,
    raw_field_sets: &mut Vec<RawFieldSet>,
    errors: &mut CompositionErrors,
) {
    for definition in &document.definitions {
        match definition {
            Definition::ObjectTypeDefinition(def) => scrape_object(
                subgraph,
                &def.name,
                &def.directives,
                &def.fields,
                false,
                &document.sources,
                metadata,
                raw_field_sets,
            ),
            Definition::ObjectTypeExtension(ext) => scrape_object(
                subgraph,
                &ext.name,
                &ext.directives,
                &ext.fields,
                true,
                &document.sources,
                metadata,
                raw_field_sets,
            ),
            Definition::InterfaceTypeDefinition(def) => scrape_non_object(
                subgraph,
                &def.name,
                &def.directives,
                Some(&def.fields),
                &document.sources,
                metadata,
                errors,
            ),
            Definition::InterfaceTypeExtension(ext) => scrape_non_object(
                subgraph,
                &ext.name,
                &ext.directives,
                Some(&ext.fields),
                &document.sources,
                metadata,
                errors,
            ),
            Definition::UnionTypeDefinition(def) => scrape_non_object(
                subgraph,
                &def.name,
                &def.directives,
                None,
                &document.sources,
                metadata,
                errors,
            ),
            Definition::EnumTypeDefinition(def) => scrape_non_object(
                subgraph,
                &def.name,
                &def.directives,
                None,
                &document.sources,
                metadata,
                errors,
            ),
            Definition::ScalarTypeDefinition(def) => scrape_non_object(
                subgraph,
                &def.name,
                &def.directives,
                None,
                &document.sources,
                metadata,
                errors,
            ),
            Definition::InputObjectTypeDefinition(def) => scrape_non_object(
                subgraph,
                &def.name,
                &def.directives,
                None,
                &document.sources,
                metadata,
                errors,
            ),
            _ => {}
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn scrape_object(
    _subgraph: &str,
    type_name: &Name,
    directives: &ast::DirectiveList,
    fields: &[Node<ast::FieldDefinition>],
    syntactic_extension: bool,
    sources: &SourceMap,
    metadata: &mut SubgraphMetadata,
    raw_field_sets: &mut Vec<RawFieldSet>,
) {
    if syntactic_extension || directives.iter().any(|d| d.name == EXTENDS_DIRECTIVE_NAME) {
        metadata.extensions.insert(type_name.clone());
    }
    for directive in directives.iter().filter(|d| d.name == KEY_DIRECTIVE_NAME) {
        raw_field_sets.push(RawFieldSet {
            type_name: type_name.clone(),
            field_name: None,
            directive_name: KEY_DIRECTIVE_NAME,
            source: fields_argument(directive),
            location: location_of(directive, sources),
        });
    }
    for field in fields {
        scrape_field(type_name, field, sources, metadata, raw_field_sets);
    }
}

fn scrape_field(
    type_name: &Name,
    field: &Node<ast::FieldDefinition>,
    sources: &SourceMap,
    metadata: &mut SubgraphMetadata,
    raw_field_sets: &mut Vec<RawFieldSet>,
) {
    let coord = (type_name.clone(), field.name.clone());
    for directive in field.directives.iter() {
        if directive.name == EXTERNAL_DIRECTIVE_NAME {
            metadata
                .external
                .insert(coord.clone(), location_of(directive, sources));
        }
    }
    for directive in field.directives.iter() {
        let directive_name = if directive.name == REQUIRES_DIRECTIVE_NAME {
            REQUIRES_DIRECTIVE_NAME
        } else if directive.name == PROVIDES_DIRECTIVE_NAME {
            PROVIDES_DIRECTIVE_NAME
        } else {
            continue;
        };
        raw_field_sets.push(RawFieldSet {
            type_name: type_name.clone(),
            field_name: Some(field.name.clone()),
            directive_name,
            source: fields_argument(directive),
            location: location_of(directive, sources),
        });
    }
}

/// Non-object definitions may not carry `@key`; `@extends` is still recorded
/// for interfaces so extension bookkeeping stays consistent.
fn scrape_non_object(
    subgraph: &str,
    type_name: &Name,
    directives: &ast::DirectiveList,
    fields: Option<&Vec<Node<ast::FieldDefinition>>>,
    sources: &SourceMap,
    metadata: &mut SubgraphMetadata,
    errors: &mut CompositionErrors,
) {
    if let Some(key) = directives.iter().find(|d| d.name == KEY_DIRECTIVE_NAME) {
        errors.push(CompositionError::SchemaKeyOnNonObject {
            subgraph: subgraph.to_owned(),
            message: format!("@key is only supported on object types, found it on \"{type_name}\""),
            locations: location_of(key, sources).into_iter().collect(),
        });
    }
    if directives.iter().any(|d| d.name == EXTENDS_DIRECTIVE_NAME) {
        metadata.extensions.insert(type_name.clone());
    }
    if let Some(fields) = fields {
        for field in fields {
            let coord = (type_name.clone(), field.name.clone());
            for directive in field.directives.iter() {
                if directive.name == EXTERNAL_DIRECTIVE_NAME {
                    metadata
                        .external
                        .insert(coord.clone(), location_of(directive, sources));
                }
            }
        }
    }
}

fn fields_argument(directive: &Node<ast::Directive>) -> Option<String> {
    directive
        .specified_argument_by_name(FIELDS_ARGUMENT_NAME)
        .and_then(|value| value.as_str())
        .map(str::to_owned)
}

fn check_unknown_directives(
    subgraph: &str,
    document: &ast::Document,
    errors: &mut CompositionErrors,
) {
    let defined: IndexSet<&str> = document
        .definitions
        .iter()
        .filter_map(|def| match def {
            Definition::DirectiveDefinition(def) => Some(def.name.as_str()),
            _ => None,
        })
        .collect();
    let mut seen: IndexSet<Name> = IndexSet::default();

    let check_list = |directives: &ast::DirectiveList,
                          seen: &mut IndexSet<Name>,
                          errors: &mut CompositionErrors| {
        for directive in directives.iter() {
            let name = &directive.name;
            if defined.contains(name.as_str())
                || is_built_in_directive(name)
                || is_federation_directive(name)
                || seen.contains(name)
            {
                continue;
            }
            seen.insert(name.clone());
            errors.push(CompositionError::SchemaUnknownDirective {
                subgraph: subgraph.to_owned(),
                message: format!(
                    "unknown directive \"@{name}\": not defined in this schema and not part of the federation directive set"
                ),
                locations: location_of(directive, &document.sources)
                    .into_iter()
                    .collect(),
            });
        }
    };

    let check_fields = |fields: &[Node<ast::FieldDefinition>],
                            seen: &mut IndexSet<Name>,
                            errors: &mut CompositionErrors| {
        for field in fields {
            check_list(&field.directives, seen, errors);
        }
    };

    for definition in &document.definitions {
        match definition {
            Definition::SchemaDefinition(def) => check_list(&def.directives, &mut seen, errors),
            Definition::SchemaExtension(ext) => check_list(&ext.directives, &mut seen, errors),
            Definition::ObjectTypeDefinition(def) => {
                check_list(&def.directives, &mut seen, errors);
                check_fields(&def.fields, &mut seen, errors);
            }
            Definition::ObjectTypeExtension(ext) => {
                check_list(&ext.directives, &mut seen, errors);
                check_fields(&ext.fields, &mut seen, errors);
            }
            Definition::InterfaceTypeDefinition(def) => {
                check_list(&def.directives, &mut seen, errors);
                check_fields(&def.fields, &mut seen, errors);
            }
            Definition::InterfaceTypeExtension(ext) => {
                check_list(&ext.directives, &mut seen, errors);
                check_fields(&ext.fields, &mut seen, errors);
            }
            Definition::UnionTypeDefinition(def) => check_list(&def.directives, &mut seen, errors),
            Definition::UnionTypeExtension(ext) => check_list(&ext.directives, &mut seen, errors),
            Definition::EnumTypeDefinition(def) => {
                check_list(&def.directives, &mut seen, errors);
                for value in &def.values {
                    check_list(&value.directives, &mut seen, errors);
                }
            }
            Definition::EnumTypeExtension(ext) => {
                check_list(&ext.directives, &mut seen, errors);
                for value in &ext.values {
                    check_list(&value.directives, &mut seen, errors);
                }
            }
            Definition::ScalarTypeDefinition(def) => check_list(&def.directives, &mut seen, errors),
            Definition::ScalarTypeExtension(ext) => check_list(&ext.directives, &mut seen, errors),
            Definition::InputObjectTypeDefinition(def) => {
                check_list(&def.directives, &mut seen, errors);
                for field in &def.fields {
                    check_list(&field.directives, &mut seen, errors);
                }
            }
            Definition::InputObjectTypeExtension(ext) => {
                check_list(&ext.directives, &mut seen, errors);
                for field in &ext.fields {
                    check_list(&field.directives, &mut seen, errors);
                }
            }
            _ => {}
        }
    }
}

fn resolve_field_sets(
    subgraph: &str,
    schema: &Schema,
    raw_field_sets: Vec<RawFieldSet>,
    metadata: &mut SubgraphMetadata,
    errors: &mut CompositionErrors,
) {
    for raw in raw_field_sets {
        let Some(source) = raw.source else {
            errors.push(CompositionError::SchemaInvalidFieldSet {
                subgraph: subgraph.to_owned(),
                message: format!(
                    "@{} on \"{}\" is missing its fields argument",
                    raw.directive_name, raw.type_name
                ),
                locations: raw.location.into_iter().collect(),
            });
            continue;
        };
        let field_set = match fieldset::parse(schema, &raw.type_name, &source) {
            Ok(field_set) => field_set,
            Err(message) => {
                errors.push(CompositionError::SchemaInvalidFieldSet {
                    subgraph: subgraph.to_owned(),
                    message: format!(
                        "@{}(fields: {source:?}) on \"{}\": {message}",
                        raw.directive_name, raw.type_name
                    ),
                    locations: raw.location.into_iter().collect(),
                });
                continue;
            }
        };
        let decl = FieldSetDecl {
            canonical: fieldset::canonical(&field_set.selection_set),
            selection_set: field_set.selection_set.clone(),
            source,
            location: raw.location,
        };
        match (raw.directive_name, raw.field_name) {
            (name, None) if name == KEY_DIRECTIVE_NAME => {
                metadata
                    .keys
                    .entry(raw.type_name)
                    .or_default()
                    .push(decl);
            }
            (name, Some(field)) if name == REQUIRES_DIRECTIVE_NAME => {
                metadata.requires.insert((raw.type_name, field), decl);
            }
            (name, Some(field)) if name == PROVIDES_DIRECTIVE_NAME => {
                metadata.provides.insert((raw.type_name, field), decl);
            }
            _ => {}
        }
    }
}

/// `@requires` only makes sense on a field of an entity this subgraph knows
/// the identity of.
fn check_requires_placement(
    subgraph: &str,
    metadata: &SubgraphMetadata,
    errors: &mut CompositionErrors,
) {
    for ((type_name, field_name), decl) in &metadata.requires {
        if !metadata.has_key(type_name) {
            errors.push(CompositionError::SchemaRequiresOnNonEntity {
                subgraph: subgraph.to_owned(),
                message: format!(
                    "@requires on \"{type_name}.{field_name}\": \"{type_name}\" has no @key in this subgraph"
                ),
                locations: decl.location.into_iter().collect(),
            });
        }
    }
}

/// `@provides` must target a field whose return type is an entity. Only the
/// locally-decidable half is checked here; the cross-subgraph half runs
/// post-composition.
fn check_provides_placement(
    subgraph: &str,
    schema: &Schema,
    metadata: &SubgraphMetadata,
    errors: &mut CompositionErrors,
) {
    for ((type_name, field_name), decl) in &metadata.provides {
        let Some(return_type) = declared_field_type(schema, type_name, field_name) else {
            continue;
        };
        let locally_keyless_object = matches!(
            schema.types.get(&return_type),
            Some(ExtendedType::Object(_))
        ) && !metadata.has_key(&return_type);
        let non_composite = matches!(
            schema.types.get(&return_type),
            Some(ExtendedType::Scalar(_) | ExtendedType::Enum(_))
        );
        if locally_keyless_object || non_composite {
            errors.push(CompositionError::SchemaProvidesOnNonEntity {
                subgraph: subgraph.to_owned(),
                message: format!(
                    "@provides on \"{type_name}.{field_name}\": return type \"{return_type}\" is not an entity in this subgraph"
                ),
                locations: decl.location.into_iter().collect(),
            });
        }
    }
}

fn declared_field_type(schema: &Schema, type_name: &Name, field_name: &Name) -> Option<Name> {
    let fields = match schema.types.get(type_name)? {
        ExtendedType::Object(object) => &object.fields,
        ExtendedType::Interface(interface) => &interface.fields,
        _ => return None,
    };
    fields
        .get(field_name)
        .map(|field| field.ty.inner_named_type().clone())
}

fn strip_federation_directives(schema: &mut Schema) {
    for ty in schema.types.values_mut() {
        match ty {
            ExtendedType::Object(object) => {
                let object = object.make_mut();
                object
                    .directives
                    .retain(|d| !is_federation_directive(&d.name));
                for field in object.fields.values_mut() {
                    field
                        .make_mut()
                        .directives
                        .retain(|d| !is_federation_directive(&d.name));
                }
            }
            ExtendedType::Interface(interface) => {
                let interface = interface.make_mut();
                interface
                    .directives
                    .retain(|d| !is_federation_directive(&d.name));
                for field in interface.fields.values_mut() {
                    field
                        .make_mut()
                        .directives
                        .retain(|d| !is_federation_directive(&d.name));
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_and_strips_federation_directives() {
        let subgraph = Subgraph::parse(
            "products",
            "http://products",
            r#"
            type Query { topProducts: [Product] }
            type Product @key(fields: "upc") {
              upc: ID!
              name: String
            }
            "#,
        )
        .unwrap();

        let product = Name::new("Product").unwrap();
        let keys = &subgraph.metadata.keys[&product];
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].canonical, "upc");
        assert!(keys[0].location.is_some());

        // the stored schema no longer mentions @key
        let sdl = subgraph.schema.to_string();
        assert!(!sdl.contains("@key"), "{sdl}");
    }

    #[test]
    fn extension_syntax_and_extends_directive_are_equivalent() {
        let with_syntax = Subgraph::parse(
            "reviews",
            "http://reviews",
            r#"
            type Query { reviews: [Int] }
            extend type Product @key(fields: "upc") { upc: ID! @external }
            "#,
        )
        .unwrap();
        let with_directive = Subgraph::parse(
            "reviews",
            "http://reviews",
            r#"
            type Query { reviews: [Int] }
            type Product @extends @key(fields: "upc") { upc: ID! @external }
            "#,
        )
        .unwrap();
        let product = Name::new("Product").unwrap();
        assert!(with_syntax.metadata.extensions.contains(&product));
        assert!(with_directive.metadata.extensions.contains(&product));
    }

    #[test]
    fn rejects_key_on_union() {
        let errors = Subgraph::parse(
            "catalog",
            "http://catalog",
            r#"
            type Query { c: Category }
            type Book { id: ID }
            type Furniture { id: ID }
            union Category @key(fields: "id") = Book | Furniture
            "#,
        )
        .unwrap_err();
        assert_eq!(errors.codes(), ["SCHEMA_KEY_ON_NON_OBJECT"]);
    }

    #[test]
    fn rejects_unknown_directive() {
        let errors = Subgraph::parse(
            "products",
            "http://products",
            r#"
            type Query { p: Int @mystery }
            "#,
        )
        .unwrap_err();
        assert_eq!(errors.codes(), ["SCHEMA_UNKNOWN_DIRECTIVE"]);
    }

    #[test]
    fn rejects_requires_on_keyless_type() {
        let errors = Subgraph::parse(
            "inventory",
            "http://inventory",
            r#"
            type Query { p: Product }
            type Product {
              weight: Int @external
              shippingEstimate: Int @requires(fields: "weight")
            }
            "#,
        )
        .unwrap_err();
        assert_eq!(errors.codes(), ["SCHEMA_REQUIRES_ON_NON_ENTITY"]);
    }

    #[test]
    fn rejects_malformed_field_set() {
        let errors = Subgraph::parse(
            "products",
            "http://products",
            r#"
            type Query { p: Product }
            type Product @key(fields: "upc {") { upc: ID! }
            "#,
        )
        .unwrap_err();
        assert_eq!(errors.codes(), ["SCHEMA_INVALID_FIELD_SET"]);
    }
}
