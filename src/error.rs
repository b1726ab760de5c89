use std::fmt::Display;
use std::fmt::Formatter;
use std::ops::Range;

use apollo_compiler::parser::LineColumn;
use serde::Deserialize;
use serde::Serialize;

/// A source position in one of the input documents, 1-indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

impl Location {
    pub(crate) fn from_range(range: Option<Range<LineColumn>>) -> Option<Self> {
        range.map(|r| Location {
            line: r.start.line,
            column: r.start.column,
        })
    }
}

/// The wire shape consumers receive: a stable code, a human-readable message,
/// and the source locations of the offending selections where available.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQLError {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<Location>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<serde_json::Map<String, serde_json::Value>>,
}

/// A single composition error. Every variant maps to a stable code via
/// [`CompositionError::code`]; composition never stops at the first error, so
/// these are always reported through [`CompositionErrors`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum CompositionError {
    #[error("[{subgraph}] {message}")]
    SchemaUnknownDirective {
        subgraph: String,
        message: String,
        locations: Vec<Location>,
    },
    #[error("[{subgraph}] {message}")]
    SchemaKeyOnNonObject {
        subgraph: String,
        message: String,
        locations: Vec<Location>,
    },
    #[error("[{subgraph}] {message}")]
    SchemaInvalidFieldSet {
        subgraph: String,
        message: String,
        locations: Vec<Location>,
    },
    #[error("[{subgraph}] {message}")]
    SchemaRequiresOnNonEntity {
        subgraph: String,
        message: String,
        locations: Vec<Location>,
    },
    #[error("[{subgraph}] {message}")]
    SchemaProvidesOnNonEntity {
        subgraph: String,
        message: String,
        locations: Vec<Location>,
    },
    #[error("[{subgraph}] {message}")]
    InvalidGraphQL { subgraph: String, message: String },
    #[error("{message}")]
    DuplicateSubgraphName { message: String },
    #[error("[{subgraph}] {message}")]
    ExternalUnused {
        subgraph: String,
        message: String,
        locations: Vec<Location>,
    },
    #[error("[{subgraph}] {message}")]
    ExternalTypeMismatch {
        subgraph: String,
        message: String,
        locations: Vec<Location>,
    },
    #[error("[{subgraph}] {message}")]
    ExternalMissingOnBase {
        subgraph: String,
        message: String,
        locations: Vec<Location>,
    },
    #[error("[{subgraph}] {message}")]
    KeyFieldsSelectInvalidType {
        subgraph: String,
        message: String,
        locations: Vec<Location>,
    },
    #[error("[{subgraph}] {message}")]
    KeyFieldsMissingOnBase {
        subgraph: String,
        message: String,
        locations: Vec<Location>,
    },
    #[error("[{subgraph}] {message}")]
    KeyMissingOnBase {
        subgraph: String,
        message: String,
        locations: Vec<Location>,
    },
    #[error("[{subgraph}] {message}")]
    KeyMissingOnExtension {
        subgraph: String,
        message: String,
        locations: Vec<Location>,
    },
    #[error("[{subgraph}] {message}")]
    ProvidesFieldsMissingExternal {
        subgraph: String,
        message: String,
        locations: Vec<Location>,
    },
    #[error("[{subgraph}] {message}")]
    ProvidesNotOnEntity {
        subgraph: String,
        message: String,
        locations: Vec<Location>,
    },
    #[error("[{subgraph}] {message}")]
    RequiresFieldsMissingExternal {
        subgraph: String,
        message: String,
        locations: Vec<Location>,
    },
    #[error("{message}")]
    ValueTypeNoEntity { message: String },
    #[error("{message}")]
    ValueTypeUnionTypesMismatch { message: String },
    #[error("{message}")]
    ValueTypeKindMismatch { message: String },
    #[error("{message}")]
    ValueTypeFieldTypeMismatch { message: String },
    #[error("{message}")]
    EntityOwnershipConflict { message: String },
    #[error("{message}")]
    FieldOwnershipConflict { message: String },
    #[error("[{subgraph}] {message}")]
    ExtensionWithNoBase { subgraph: String, message: String },
    #[error("{message}")]
    Internal { message: String },
}

impl CompositionError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::SchemaUnknownDirective { .. } => "SCHEMA_UNKNOWN_DIRECTIVE",
            Self::SchemaKeyOnNonObject { .. } => "SCHEMA_KEY_ON_NON_OBJECT",
            Self::SchemaInvalidFieldSet { .. } => "SCHEMA_INVALID_FIELD_SET",
            Self::SchemaRequiresOnNonEntity { .. } => "SCHEMA_REQUIRES_ON_NON_ENTITY",
            Self::SchemaProvidesOnNonEntity { .. } => "SCHEMA_PROVIDES_ON_NON_ENTITY",
            Self::InvalidGraphQL { .. } => "INVALID_GRAPHQL",
            Self::DuplicateSubgraphName { .. } => "DUPLICATE_SUBGRAPH_NAME",
            Self::ExternalUnused { .. } => "EXTERNAL_UNUSED",
            Self::ExternalTypeMismatch { .. } => "EXTERNAL_TYPE_MISMATCH",
            Self::ExternalMissingOnBase { .. } => "EXTERNAL_MISSING_ON_BASE",
            Self::KeyFieldsSelectInvalidType { .. } => "KEY_FIELDS_SELECT_INVALID_TYPE",
            Self::KeyFieldsMissingOnBase { .. } => "KEY_FIELDS_MISSING_ON_BASE",
            Self::KeyMissingOnBase { .. } => "KEY_MISSING_ON_BASE",
            Self::KeyMissingOnExtension { .. } => "KEY_MISSING_ON_EXTENSION",
            Self::ProvidesFieldsMissingExternal { .. } => "PROVIDES_FIELDS_MISSING_EXTERNAL",
            Self::ProvidesNotOnEntity { .. } => "PROVIDES_NOT_ON_ENTITY",
            Self::RequiresFieldsMissingExternal { .. } => "REQUIRES_FIELDS_MISSING_EXTERNAL",
            Self::ValueTypeNoEntity { .. } => "VALUE_TYPE_NO_ENTITY",
            Self::ValueTypeUnionTypesMismatch { .. } => "VALUE_TYPE_UNION_TYPES_IDENTICAL",
            Self::ValueTypeKindMismatch { .. } => "VALUE_TYPE_KIND_MISMATCH",
            Self::ValueTypeFieldTypeMismatch { .. } => "VALUE_TYPE_FIELD_TYPE_MISMATCH",
            Self::EntityOwnershipConflict { .. } => "ENTITY_OWNERSHIP_CONFLICT",
            Self::FieldOwnershipConflict { .. } => "FIELD_OWNERSHIP_CONFLICT",
            Self::ExtensionWithNoBase { .. } => "EXTENSION_WITH_NO_BASE",
            Self::Internal { .. } => "INTERNAL",
        }
    }

    pub fn locations(&self) -> &[Location] {
        match self {
            Self::SchemaUnknownDirective { locations, .. }
            | Self::SchemaKeyOnNonObject { locations, .. }
            | Self::SchemaInvalidFieldSet { locations, .. }
            | Self::SchemaRequiresOnNonEntity { locations, .. }
            | Self::SchemaProvidesOnNonEntity { locations, .. }
            | Self::ExternalUnused { locations, .. }
            | Self::ExternalTypeMismatch { locations, .. }
            | Self::ExternalMissingOnBase { locations, .. }
            | Self::KeyFieldsSelectInvalidType { locations, .. }
            | Self::KeyFieldsMissingOnBase { locations, .. }
            | Self::KeyMissingOnBase { locations, .. }
            | Self::KeyMissingOnExtension { locations, .. }
            | Self::ProvidesFieldsMissingExternal { locations, .. }
            | Self::ProvidesNotOnEntity { locations, .. }
            | Self::RequiresFieldsMissingExternal { locations, .. } => locations,
            _ => &[],
        }
    }

    pub fn to_graphql_error(&self) -> GraphQLError {
        GraphQLError {
            code: self.code().to_owned(),
            message: self.to_string(),
            locations: self.locations().to_vec(),
            extensions: None,
        }
    }
}

/// The aggregated result of a failed composition. The composer runs every
/// validation pass and returns the full list, never just the first hit.
#[derive(Debug, Clone, Default)]
pub struct CompositionErrors {
    pub errors: Vec<CompositionError>,
}

impl CompositionErrors {
    pub(crate) fn push(&mut self, error: CompositionError) {
        self.errors.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn to_graphql_errors(&self) -> Vec<GraphQLError> {
        self.errors
            .iter()
            .map(CompositionError::to_graphql_error)
            .collect()
    }

    pub fn codes(&self) -> Vec<&'static str> {
        self.errors.iter().map(CompositionError::code).collect()
    }
}

impl Display for CompositionErrors {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "composition failed with {} error(s):", self.errors.len())?;
        for error in &self.errors {
            writeln!(f, "  [{}] {}", error.code(), error)?;
        }
        Ok(())
    }
}

impl std::error::Error for CompositionErrors {}

impl IntoIterator for CompositionErrors {
    type Item = CompositionError;
    type IntoIter = std::vec::IntoIter<CompositionError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.into_iter()
    }
}

/// Failure to ingest a supergraph SDL document.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SupergraphError {
    #[error("unsupported core feature {feature:?}")]
    UnsupportedFeature { feature: String },
    #[error("{message}")]
    InvalidGraphQL { message: String },
    #[error("{message}")]
    Internal { message: String },
}

impl SupergraphError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnsupportedFeature { .. } => "UNSUPPORTED_FEATURE",
            Self::InvalidGraphQL { .. } => "INVALID_GRAPHQL",
            Self::Internal { .. } => "INTERNAL",
        }
    }
}

/// A planning failure. Fatal for the single operation; returned as the
/// planning result rather than thrown out-of-band.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PlannerError {
    #[error("{message}")]
    NoResolver { message: String },
    #[error("{message}")]
    UnsatisfiableRequires { message: String },
    #[error("{message}")]
    SubscriptionInMultipleSubgraphs { message: String },
    #[error("{message}")]
    InvalidOperation { message: String },
    #[error("{message}")]
    Internal { message: String },
}

impl PlannerError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoResolver { .. } => "NO_RESOLVER",
            Self::UnsatisfiableRequires { .. } => "UNSATISFIABLE_REQUIRES",
            Self::SubscriptionInMultipleSubgraphs { .. } => "SUBSCRIPTION_IN_MULTIPLE_SUBGRAPHS",
            Self::InvalidOperation { .. } => "INVALID_OPERATION",
            Self::Internal { .. } => "INTERNAL",
        }
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn to_graphql_error(&self) -> GraphQLError {
        GraphQLError {
            code: self.code().to_owned(),
            message: self.to_string(),
            locations: Vec::new(),
            extensions: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graphql_error_serialization_skips_empty_locations() {
        let error = GraphQLError {
            code: "EXTERNAL_UNUSED".to_owned(),
            message: "field is never used".to_owned(),
            locations: Vec::new(),
            extensions: None,
        };
        assert_eq!(
            serde_json::to_value(&error).unwrap(),
            serde_json::json!({
                "code": "EXTERNAL_UNUSED",
                "message": "field is never used",
            })
        );
    }

    #[test]
    fn composition_error_codes_are_stable() {
        let error = CompositionError::ValueTypeUnionTypesMismatch {
            message: "union members differ".to_owned(),
        };
        assert_eq!(error.code(), "VALUE_TYPE_UNION_TYPES_IDENTICAL");
        let error = CompositionError::ExternalUnused {
            subgraph: "reviews".to_owned(),
            message: "unused".to_owned(),
            locations: vec![Location { line: 3, column: 9 }],
        };
        assert_eq!(error.code(), "EXTERNAL_UNUSED");
        assert_eq!(error.to_graphql_error().locations.len(), 1);
    }
}
