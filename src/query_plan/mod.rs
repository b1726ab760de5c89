//! The query plan model: an executable tree of subgraph fetches with
//! entity-join steps. Serializes to the stable JSON representation the
//! gateway runtime executes, with every node tagged by its kind.

use serde::Deserialize;
use serde::Serialize;

mod builder;
mod display;
mod printer;

pub use builder::QueryPlanner;

/// Query planning options. Currently empty; the struct keeps the planner
/// signature stable while options come and go.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct QueryPlanOptions {}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub struct QueryPlan {
    pub node: Option<PlanNode>,
}

impl QueryPlan {
    pub fn into_json(self) -> serde_json::Value {
        serde_json::to_value(self).expect("a query plan always serializes")
    }

    pub fn from_json(value: serde_json::Value) -> serde_json::Result<QueryPlan> {
        serde_json::from_value(value)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", tag = "kind")]
pub enum PlanNode {
    /// Execute nodes in order; later nodes may depend on earlier results.
    Sequence { nodes: Vec<PlanNode> },
    /// Execute nodes concurrently; no dependencies between them.
    Parallel { nodes: Vec<PlanNode> },
    /// A single subgraph request.
    Fetch(FetchNode),
    /// Apply the child node to the results located at `path` in the
    /// assembled response.
    Flatten(FlattenNode),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchNode {
    pub service_name: String,
    pub variable_usages: Vec<String>,
    /// For entity fetches: the representation selection gathered at the
    /// enclosing [`FlattenNode`]'s path and passed to `_entities`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requires: Option<SelectionSet>,
    pub operation: GraphQLDocument,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlattenNode {
    pub path: Vec<ResponsePathElement>,
    pub node: Box<PlanNode>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", tag = "kind")]
pub enum Selection {
    Field(Field),
    InlineFragment(InlineFragment),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selections: Option<SelectionSet>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineFragment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_condition: Option<String>,
    pub selections: SelectionSet,
}

/// A step in a response path. `Field("@")` addresses every element of a
/// list; concrete indices only appear in paths produced at execution time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponsePathElement {
    Field(String),
    Idx(u32),
}

impl std::fmt::Display for ResponsePathElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponsePathElement::Field(name) => name.fmt(f),
            ResponsePathElement::Idx(i) => i.fmt(f),
        }
    }
}

pub type SelectionSet = Vec<Selection>;
pub type GraphQLDocument = String;
