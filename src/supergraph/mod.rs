//! The composed supergraph: one GraphQL schema plus the join metadata that
//! records which subgraph resolves what.
//!
//! Cross-references use arena indices ([`GraphId`] into the graph table,
//! type/field names into the schema) rather than pointer graphs, since
//! entities routinely refer to each other across subgraphs.

use apollo_compiler::collections::IndexMap;
use apollo_compiler::schema::ExtendedType;
use apollo_compiler::Name;
use apollo_compiler::Schema;

use crate::error::SupergraphError;
use crate::subgraph::FieldCoord;

pub(crate) mod csdl;

/// Index into [`JoinMetadata::graphs`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GraphId(pub(crate) u16);

/// One row of the graph table: the enum value naming the subgraph in the
/// supergraph SDL, and the subgraph's name and routing URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinGraph {
    pub enum_value: Name,
    pub name: String,
    pub url: String,
}

/// Join metadata for an entity type: the owning subgraph and every
/// subgraph-key pair declared for it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TypeJoin {
    pub owner: Option<GraphId>,
    /// `(graph, canonical key field set)` in graph-table order, then
    /// declaration order.
    pub keys: Vec<(GraphId, String)>,
}

/// Join metadata for a field: the subgraph that resolves it plus its
/// `requires`/`provides` field sets, when present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldJoin {
    pub graph: GraphId,
    pub requires: Option<String>,
    pub provides: Option<String>,
}

/// Everything the query planner needs beyond the schema itself.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct JoinMetadata {
    /// Bijection between enum values and subgraphs, sorted by subgraph name.
    pub graphs: Vec<JoinGraph>,
    /// Entity types only; value types carry no join metadata.
    pub types: IndexMap<Name, TypeJoin>,
    /// Fields whose resolver differs from the type's owner, root fields, and
    /// fields with `requires`/`provides`.
    pub fields: IndexMap<FieldCoord, FieldJoin>,
}

/// How a field is resolved, from the planner's point of view.
#[derive(Debug, Clone)]
pub(crate) enum FieldResolution {
    /// Resolvable by whichever subgraph produced the enclosing object
    /// (value types, introspection, entity fields implied by ownership when
    /// the type has no recorded owner).
    Any,
    /// Resolvable by exactly one subgraph.
    Fixed {
        graph: GraphId,
        requires: Option<String>,
        provides: Option<String>,
    },
}

impl JoinMetadata {
    pub fn graph(&self, id: GraphId) -> &JoinGraph {
        &self.graphs[id.0 as usize]
    }

    pub fn graph_by_name(&self, name: &str) -> Option<GraphId> {
        self.graphs
            .iter()
            .position(|g| g.name == name)
            .map(|i| GraphId(i as u16))
    }

    pub(crate) fn graph_by_enum_value(&self, value: &str) -> Option<GraphId> {
        self.graphs
            .iter()
            .position(|g| g.enum_value == value)
            .map(|i| GraphId(i as u16))
    }

    pub fn is_entity(&self, type_name: &Name) -> bool {
        self.types
            .get(type_name)
            .is_some_and(|join| join.owner.is_some())
    }

    /// Keys declared for `type_name` by `graph`, in declaration order.
    pub fn keys(&self, type_name: &Name, graph: GraphId) -> Vec<&str> {
        self.types
            .get(type_name)
            .map(|join| {
                join.keys
                    .iter()
                    .filter(|(g, _)| *g == graph)
                    .map(|(_, key)| key.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(crate) fn resolution(&self, type_name: &Name, field_name: &Name) -> FieldResolution {
        if let Some(join) = self.fields.get(&(type_name.clone(), field_name.clone())) {
            return FieldResolution::Fixed {
                graph: join.graph,
                requires: join.requires.clone(),
                provides: join.provides.clone(),
            };
        }
        match self.types.get(type_name).and_then(|join| join.owner) {
            Some(owner) => FieldResolution::Fixed {
                graph: owner,
                requires: None,
                provides: None,
            },
            None => FieldResolution::Any,
        }
    }
}

/// The single merged schema plus routing metadata. Immutable once built; a
/// gateway may share one instance across any number of concurrent plans.
#[derive(Debug, Clone)]
pub struct Supergraph {
    /// The composed schema, free of `join__`/`core__` artifacts.
    pub schema: Schema,
    pub metadata: JoinMetadata,
}

impl Supergraph {
    /// Renders the supergraph as a self-describing SDL document annotated
    /// with `@core`/`@join__*` directives.
    pub fn to_sdl(&self) -> String {
        csdl::build(self)
    }

    /// Reconstructs a supergraph from SDL produced by [`Supergraph::to_sdl`]
    /// (or any other composer emitting `core/v0.1` + `join/v0.1`).
    pub fn parse(sdl: &str) -> Result<Self, SupergraphError> {
        csdl::parse(sdl)
    }

    /// The client-facing schema: everything prefixed `core__`/`join__` and
    /// every `@core`/`@join__*` application removed.
    pub fn to_api_schema(&self) -> Schema {
        let mut api = self.schema.clone();
        api.schema_definition
            .make_mut()
            .directives
            .retain(|d| !is_join_directive(&d.name));
        api.types
            .retain(|name, _| !is_join_name(name.as_str()));
        api.directive_definitions
            .retain(|name, _| !is_join_directive(name.as_str()));
        for ty in api.types.values_mut() {
            match ty {
                ExtendedType::Object(object) => {
                    let object = object.make_mut();
                    object.directives.retain(|d| !is_join_directive(&d.name));
                    for field in object.fields.values_mut() {
                        field
                            .make_mut()
                            .directives
                            .retain(|d| !is_join_directive(&d.name));
                    }
                }
                ExtendedType::Interface(interface) => {
                    let interface = interface.make_mut();
                    interface.directives.retain(|d| !is_join_directive(&d.name));
                    for field in interface.fields.values_mut() {
                        field
                            .make_mut()
                            .directives
                            .retain(|d| !is_join_directive(&d.name));
                    }
                }
                ExtendedType::Union(union_) => {
                    union_
                        .make_mut()
                        .directives
                        .retain(|d| !is_join_directive(&d.name));
                }
                ExtendedType::Enum(enum_) => {
                    let enum_ = enum_.make_mut();
                    enum_.directives.retain(|d| !is_join_directive(&d.name));
                    for value in enum_.values.values_mut() {
                        value
                            .make_mut()
                            .directives
                            .retain(|d| !is_join_directive(&d.name));
                    }
                }
                ExtendedType::Scalar(scalar) => {
                    scalar
                        .make_mut()
                        .directives
                        .retain(|d| !is_join_directive(&d.name));
                }
                ExtendedType::InputObject(input) => {
                    input
                        .make_mut()
                        .directives
                        .retain(|d| !is_join_directive(&d.name));
                }
            }
        }
        api
    }
}

pub(crate) fn is_join_name(name: &str) -> bool {
    name.starts_with("join__") || name.starts_with("core__")
}

pub(crate) fn is_join_directive(name: &str) -> bool {
    name == "core" || name.starts_with("join__")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graph_table_lookups_are_bijective() {
        let metadata = JoinMetadata {
            graphs: vec![
                JoinGraph {
                    enum_value: Name::new("ACCOUNTS").unwrap(),
                    name: "accounts".to_owned(),
                    url: "http://accounts".to_owned(),
                },
                JoinGraph {
                    enum_value: Name::new("REVIEWS").unwrap(),
                    name: "reviews".to_owned(),
                    url: "http://reviews".to_owned(),
                },
            ],
            ..Default::default()
        };
        let reviews = metadata.graph_by_name("reviews").unwrap();
        assert_eq!(reviews, GraphId(1));
        assert_eq!(metadata.graph(reviews).enum_value, "REVIEWS");
        assert_eq!(metadata.graph_by_enum_value("ACCOUNTS"), Some(GraphId(0)));
        assert_eq!(metadata.graph_by_name("products"), None);
    }
}
