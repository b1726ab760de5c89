//! Names and shapes of the federation directive set recognized on subgraph
//! schemas. These directives configure routing; they are recorded in the
//! subgraph's side table and stripped from the user-visible schema.

pub(crate) const KEY_DIRECTIVE_NAME: &str = "key";
pub(crate) const EXTERNAL_DIRECTIVE_NAME: &str = "external";
pub(crate) const REQUIRES_DIRECTIVE_NAME: &str = "requires";
pub(crate) const PROVIDES_DIRECTIVE_NAME: &str = "provides";
pub(crate) const EXTENDS_DIRECTIVE_NAME: &str = "extends";

pub(crate) const FIELDS_ARGUMENT_NAME: &str = "fields";

pub(crate) const FEDERATION_DIRECTIVE_NAMES: [&str; 5] = [
    KEY_DIRECTIVE_NAME,
    EXTERNAL_DIRECTIVE_NAME,
    REQUIRES_DIRECTIVE_NAME,
    PROVIDES_DIRECTIVE_NAME,
    EXTENDS_DIRECTIVE_NAME,
];

const GRAPHQL_BUILT_IN_DIRECTIVE_NAMES: [&str; 4] =
    ["skip", "include", "deprecated", "specifiedBy"];

pub(crate) fn is_federation_directive(name: &str) -> bool {
    FEDERATION_DIRECTIVE_NAMES.contains(&name)
}

pub(crate) fn is_built_in_directive(name: &str) -> bool {
    GRAPHQL_BUILT_IN_DIRECTIVE_NAMES.contains(&name)
}
