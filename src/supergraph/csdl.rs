//! Emission and ingest of the self-describing supergraph SDL: the composed
//! schema annotated with `@core` and `@join__*` directives, portable between
//! the composer and any gateway that can read `core/v0.1` + `join/v0.1`.

use apollo_compiler::ast;
use apollo_compiler::name;
use apollo_compiler::schema::Component;
use apollo_compiler::schema::EnumType;
use apollo_compiler::schema::EnumValueDefinition;
use apollo_compiler::schema::ExtendedType;
use apollo_compiler::schema::ScalarType;
use apollo_compiler::Name;
use apollo_compiler::Node;
use apollo_compiler::Schema;

use crate::error::SupergraphError;
use crate::supergraph::FieldJoin;
use crate::supergraph::JoinGraph;
use crate::supergraph::JoinMetadata;
use crate::supergraph::Supergraph;
use crate::supergraph::TypeJoin;

const CORE_FEATURE_URL: &str = "https://specs.apollo.dev/core/v0.1";
const JOIN_FEATURE_URL: &str = "https://specs.apollo.dev/join/v0.1";

pub(crate) fn build(supergraph: &Supergraph) -> String {
    let mut schema = supergraph.schema.clone();
    let metadata = &supergraph.metadata;

    for feature in [CORE_FEATURE_URL, JOIN_FEATURE_URL] {
        let core = directive(
            name!("core"),
            vec![(name!("feature"), ast::Value::String(feature.to_owned()))],
        );
        schema.schema_definition.make_mut().directives.push(core);
    }

    add_join_definitions(&mut schema, metadata);

    for (type_name, join) in &metadata.types {
        let Some(ty) = schema.types.get_mut(type_name) else {
            continue;
        };
        let mut directives = Vec::new();
        if let Some(owner) = join.owner {
            directives.push(directive(
                name!("join__owner"),
                vec![(
                    name!("graph"),
                    ast::Value::Enum(metadata.graph(owner).enum_value.clone()),
                )],
            ));
        }
        for (graph, key) in &join.keys {
            directives.push(directive(
                name!("join__type"),
                vec![
                    (
                        name!("graph"),
                        ast::Value::Enum(metadata.graph(*graph).enum_value.clone()),
                    ),
                    (name!("key"), ast::Value::String(key.clone())),
                ],
            ));
        }
        match ty {
            ExtendedType::Object(object) => {
                let object = object.make_mut();
                object.directives.extend(directives.into_iter().map(Component::from));
            }
            ExtendedType::Interface(interface) => {
                let interface = interface.make_mut();
                interface.directives.extend(directives.into_iter().map(Component::from));
            }
            _ => {}
        }
    }

    for ((type_name, field_name), join) in &metadata.fields {
        let Some(ty) = schema.types.get_mut(type_name) else {
            continue;
        };
        let fields = match ty {
            ExtendedType::Object(object) => &mut object.make_mut().fields,
            ExtendedType::Interface(interface) => &mut interface.make_mut().fields,
            _ => continue,
        };
        let Some(field) = fields.get_mut(field_name) else {
            continue;
        };
        let mut arguments = vec![(
            name!("graph"),
            ast::Value::Enum(metadata.graph(join.graph).enum_value.clone()),
        )];
        if let Some(requires) = &join.requires {
            arguments.push((name!("requires"), ast::Value::String(requires.clone())));
        }
        if let Some(provides) = &join.provides {
            arguments.push((name!("provides"), ast::Value::String(provides.clone())));
        }
        field
            .make_mut()
            .directives
            .push(Node::new(directive(name!("join__field"), arguments)));
    }

    schema.to_string()
}

fn directive(name: Name, arguments: Vec<(Name, ast::Value)>) -> ast::Directive {
    ast::Directive {
        name,
        arguments: arguments
            .into_iter()
            .map(|(name, value)| {
                Node::new(ast::Argument {
                    name,
                    value: Node::new(value),
                })
            })
            .collect(),
    }
}

fn input_value(name: Name, ty: ast::Type) -> Node<ast::InputValueDefinition> {
    Node::new(ast::InputValueDefinition {
        description: None,
        name,
        ty: Node::new(ty),
        default_value: None,
        directives: Default::default(),
    })
}

fn directive_definition(
    name: Name,
    arguments: Vec<Node<ast::InputValueDefinition>>,
    repeatable: bool,
    locations: Vec<ast::DirectiveLocation>,
) -> Node<ast::DirectiveDefinition> {
    Node::new(ast::DirectiveDefinition {
        description: None,
        name,
        arguments,
        repeatable,
        locations,
    })
}

fn add_join_definitions(schema: &mut Schema, metadata: &JoinMetadata) {
    use ast::DirectiveLocation::*;
    use ast::Type;

    schema.directive_definitions.insert(
        name!("core"),
        directive_definition(
            name!("core"),
            vec![input_value(name!("feature"), Type::NonNullNamed(name!("String")))],
            true,
            vec![Schema],
        ),
    );
    schema.directive_definitions.insert(
        name!("join__graph"),
        directive_definition(
            name!("join__graph"),
            vec![
                input_value(name!("name"), Type::NonNullNamed(name!("String"))),
                input_value(name!("url"), Type::NonNullNamed(name!("String"))),
            ],
            false,
            vec![EnumValue],
        ),
    );
    schema.directive_definitions.insert(
        name!("join__owner"),
        directive_definition(
            name!("join__owner"),
            vec![input_value(name!("graph"), Type::NonNullNamed(name!("join__Graph")))],
            false,
            vec![Object, Interface],
        ),
    );
    schema.directive_definitions.insert(
        name!("join__type"),
        directive_definition(
            name!("join__type"),
            vec![
                input_value(name!("graph"), Type::NonNullNamed(name!("join__Graph"))),
                input_value(name!("key"), Type::Named(name!("join__FieldSet"))),
            ],
            true,
            vec![Object, Interface],
        ),
    );
    schema.directive_definitions.insert(
        name!("join__field"),
        directive_definition(
            name!("join__field"),
            vec![
                input_value(name!("graph"), Type::Named(name!("join__Graph"))),
                input_value(name!("requires"), Type::Named(name!("join__FieldSet"))),
                input_value(name!("provides"), Type::Named(name!("join__FieldSet"))),
            ],
            false,
            vec![FieldDefinition],
        ),
    );

    schema.types.insert(
        name!("join__FieldSet"),
        ExtendedType::Scalar(Node::new(ScalarType {
            description: None,
            name: name!("join__FieldSet"),
            directives: Default::default(),
        })),
    );

    let mut values = apollo_compiler::collections::IndexMap::default();
    for graph in &metadata.graphs {
        let mut value = EnumValueDefinition {
            description: None,
            value: graph.enum_value.clone(),
            directives: Default::default(),
        };
        value.directives.push(Node::new(directive(
            name!("join__graph"),
            vec![
                (name!("name"), ast::Value::String(graph.name.clone())),
                (name!("url"), ast::Value::String(graph.url.clone())),
            ],
        )));
        values.insert(graph.enum_value.clone(), Component::from(value));
    }
    schema.types.insert(
        name!("join__Graph"),
        ExtendedType::Enum(Node::new(EnumType {
            description: None,
            name: name!("join__Graph"),
            directives: Default::default(),
            values,
        })),
    );
}

pub(crate) fn parse(sdl: &str) -> Result<Supergraph, SupergraphError> {
    let schema = Schema::parse(sdl, "supergraph.graphql").map_err(|err| {
        SupergraphError::InvalidGraphQL {
            message: err.errors.to_string(),
        }
    })?;

    check_features(&schema)?;
    let graphs = read_graph_table(&schema)?;
    let mut metadata = JoinMetadata {
        graphs,
        ..Default::default()
    };
    read_joins(&schema, &mut metadata)?;

    let mut supergraph = Supergraph { schema, metadata };
    // Drop the join/core machinery; the metadata now carries it.
    supergraph.schema = supergraph.to_api_schema();
    Ok(supergraph)
}

fn check_features(schema: &Schema) -> Result<(), SupergraphError> {
    let mut saw_core = false;
    let mut saw_join = false;
    for core in schema.schema_definition.directives.get_all("core") {
        let Some(feature) = core
            .specified_argument_by_name("feature")
            .and_then(|value| value.as_str())
        else {
            return Err(SupergraphError::InvalidGraphQL {
                message: "@core is missing its feature argument".to_owned(),
            });
        };
        match feature {
            CORE_FEATURE_URL => saw_core = true,
            JOIN_FEATURE_URL => saw_join = true,
            other => {
                return Err(SupergraphError::UnsupportedFeature {
                    feature: other.to_owned(),
                });
            }
        }
    }
    if !saw_core || !saw_join {
        return Err(SupergraphError::InvalidGraphQL {
            message: format!(
                "not a supergraph document: expected @core(feature: {CORE_FEATURE_URL:?}) and @core(feature: {JOIN_FEATURE_URL:?}) on the schema definition"
            ),
        });
    }
    Ok(())
}

fn read_graph_table(schema: &Schema) -> Result<Vec<JoinGraph>, SupergraphError> {
    let Some(ExtendedType::Enum(graph_enum)) = schema.types.get("join__Graph") else {
        return Err(SupergraphError::InvalidGraphQL {
            message: "supergraph is missing the join__Graph enum".to_owned(),
        });
    };
    let mut graphs = Vec::with_capacity(graph_enum.values.len());
    for (enum_value, definition) in &graph_enum.values {
        let Some(join_graph) = definition.directives.get("join__graph") else {
            return Err(SupergraphError::InvalidGraphQL {
                message: format!("join__Graph value {enum_value} is missing @join__graph"),
            });
        };
        let name = string_argument(join_graph, "name");
        let url = string_argument(join_graph, "url");
        let (Some(name), Some(url)) = (name, url) else {
            return Err(SupergraphError::InvalidGraphQL {
                message: format!("@join__graph on {enum_value} needs name and url arguments"),
            });
        };
        graphs.push(JoinGraph {
            enum_value: enum_value.clone(),
            name,
            url,
        });
    }
    Ok(graphs)
}

fn read_joins(schema: &Schema, metadata: &mut JoinMetadata) -> Result<(), SupergraphError> {
    for (type_name, ty) in &schema.types {
        let (directives, fields) = match ty {
            ExtendedType::Object(object) => (&object.directives, &object.fields),
            ExtendedType::Interface(interface) => (&interface.directives, &interface.fields),
            _ => continue,
        };

        let mut join = TypeJoin::default();
        if let Some(owner) = directives.get("join__owner") {
            join.owner = Some(graph_argument(metadata, owner, type_name)?);
        }
        for join_type in directives.get_all("join__type") {
            let graph = graph_argument(metadata, join_type, type_name)?;
            let Some(key) = string_argument(join_type, "key") else {
                return Err(SupergraphError::InvalidGraphQL {
                    message: format!("@join__type on {type_name} is missing its key argument"),
                });
            };
            join.keys.push((graph, key));
        }
        if join.owner.is_some() || !join.keys.is_empty() {
            metadata.types.insert(type_name.clone(), join);
        }

        for (field_name, field) in fields {
            let Some(join_field) = field.directives.get("join__field") else {
                continue;
            };
            let graph = graph_argument(metadata, join_field, type_name)?;
            metadata.fields.insert(
                (type_name.clone(), field_name.clone()),
                FieldJoin {
                    graph,
                    requires: string_argument(join_field, "requires"),
                    provides: string_argument(join_field, "provides"),
                },
            );
        }
    }
    Ok(())
}

fn string_argument(directive: &ast::Directive, name: &str) -> Option<String> {
    directive
        .specified_argument_by_name(name)
        .and_then(|value| value.as_str())
        .map(str::to_owned)
}

fn graph_argument(
    metadata: &JoinMetadata,
    directive: &ast::Directive,
    type_name: &Name,
) -> Result<crate::supergraph::GraphId, SupergraphError> {
    let value = directive
        .specified_argument_by_name("graph")
        .and_then(|value| value.as_enum())
        .ok_or_else(|| SupergraphError::InvalidGraphQL {
            message: format!("@{} on {type_name} is missing its graph argument", directive.name),
        })?;
    metadata
        .graph_by_enum_value(value)
        .ok_or_else(|| SupergraphError::InvalidGraphQL {
            message: format!("unknown graph {value} referenced on {type_name}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_feature_version() {
        let err = parse(
            r#"
            schema
              @core(feature: "https://specs.apollo.dev/core/v0.1")
              @core(feature: "https://specs.apollo.dev/join/v0.2")
            { query: Query }
            directive @core(feature: String!) repeatable on SCHEMA
            type Query { x: Int }
            "#,
        )
        .unwrap_err();
        match err {
            SupergraphError::UnsupportedFeature { feature } => {
                assert_eq!(feature, "https://specs.apollo.dev/join/v0.2");
            }
            other => panic!("expected UNSUPPORTED_FEATURE, got {other:?}"),
        }
    }

    #[test]
    fn rejects_plain_schema() {
        let err = parse("type Query { x: Int }").unwrap_err();
        assert_eq!(err.code(), "INVALID_GRAPHQL");
    }
}
