//! Human-readable, indented rendering of query plans, used in tests and
//! debug logging.

use std::fmt;

use crate::query_plan::FetchNode;
use crate::query_plan::FlattenNode;
use crate::query_plan::PlanNode;
use crate::query_plan::QueryPlan;
use crate::query_plan::Selection;

impl fmt::Display for QueryPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "QueryPlan {{")?;
        if let Some(node) = &self.node {
            write_node(f, node, 1)?;
        }
        write!(f, "}}")
    }
}

impl fmt::Display for PlanNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_node(f, self, 0)
    }
}

fn indent(f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
    write!(f, "{:width$}", "", width = depth * 2)
}

fn write_node(f: &mut fmt::Formatter<'_>, node: &PlanNode, depth: usize) -> fmt::Result {
    match node {
        PlanNode::Sequence { nodes } => write_list(f, "Sequence", nodes, depth),
        PlanNode::Parallel { nodes } => write_list(f, "Parallel", nodes, depth),
        PlanNode::Fetch(fetch) => write_fetch(f, fetch, depth),
        PlanNode::Flatten(flatten) => write_flatten(f, flatten, depth),
    }
}

fn write_list(
    f: &mut fmt::Formatter<'_>,
    kind: &str,
    nodes: &[PlanNode],
    depth: usize,
) -> fmt::Result {
    indent(f, depth)?;
    writeln!(f, "{kind} {{")?;
    for node in nodes {
        write_node(f, node, depth + 1)?;
    }
    indent(f, depth)?;
    writeln!(f, "}},")
}

fn write_fetch(f: &mut fmt::Formatter<'_>, fetch: &FetchNode, depth: usize) -> fmt::Result {
    indent(f, depth)?;
    writeln!(f, "Fetch(service: {:?}) {{", fetch.service_name)?;
    if let Some(requires) = &fetch.requires {
        indent(f, depth + 1)?;
        write_selections(f, requires)?;
        writeln!(f, " =>")?;
    }
    indent(f, depth + 1)?;
    writeln!(f, "{}", fetch.operation)?;
    indent(f, depth)?;
    writeln!(f, "}},")
}

fn write_flatten(f: &mut fmt::Formatter<'_>, flatten: &FlattenNode, depth: usize) -> fmt::Result {
    indent(f, depth)?;
    let path = flatten
        .path
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(".");
    writeln!(f, "Flatten(path: \"{path}\") {{")?;
    write_node(f, &flatten.node, depth + 1)?;
    indent(f, depth)?;
    writeln!(f, "}},")
}

fn write_selections(f: &mut fmt::Formatter<'_>, selections: &[Selection]) -> fmt::Result {
    write!(f, "{{")?;
    let mut first = true;
    for selection in selections {
        if !first {
            write!(f, " ")?;
        }
        first = false;
        match selection {
            Selection::Field(field) => {
                if let Some(alias) = &field.alias {
                    write!(f, "{alias}:")?;
                }
                write!(f, "{}", field.name)?;
                if let Some(sub) = &field.selections {
                    write_selections(f, sub)?;
                }
            }
            Selection::InlineFragment(frag) => {
                write!(f, "...")?;
                if let Some(condition) = &frag.type_condition {
                    write!(f, "on {condition}")?;
                }
                write_selections(f, &frag.selections)?;
            }
        }
    }
    write!(f, "}}")
}

#[cfg(test)]
mod tests {
    use crate::query_plan::Field;
    use crate::query_plan::FetchNode;
    use crate::query_plan::PlanNode;
    use crate::query_plan::QueryPlan;
    use crate::query_plan::ResponsePathElement;

    #[test]
    fn renders_an_indented_tree() {
        let plan = QueryPlan {
            node: Some(PlanNode::Sequence {
                nodes: vec![
                    PlanNode::Fetch(FetchNode {
                        service_name: "products".to_owned(),
                        variable_usages: vec![],
                        requires: None,
                        operation: "{topProducts{__typename upc}}".to_owned(),
                    }),
                    PlanNode::Flatten(crate::query_plan::FlattenNode {
                        path: vec![
                            ResponsePathElement::Field("topProducts".to_owned()),
                            ResponsePathElement::Field("@".to_owned()),
                        ],
                        node: Box::new(PlanNode::Fetch(FetchNode {
                            service_name: "reviews".to_owned(),
                            variable_usages: vec![],
                            requires: Some(vec![crate::query_plan::Selection::Field(Field {
                                alias: None,
                                name: "__typename".to_owned(),
                                selections: None,
                            })]),
                            operation: "query($representations:[_Any!]!){_entities(representations:$representations){...on Product{reviews{body}}}}".to_owned(),
                        })),
                    }),
                ],
            }),
        };
        let rendered = plan.to_string();
        assert_eq!(
            rendered,
            "QueryPlan {\n  Sequence {\n    Fetch(service: \"products\") {\n      {topProducts{__typename upc}}\n    },\n    Flatten(path: \"topProducts.@\") {\n      Fetch(service: \"reviews\") {\n        {__typename} =>\n        query($representations:[_Any!]!){_entities(representations:$representations){...on Product{reviews{body}}}}\n      },\n    },\n  },\n}"
        );
    }
}
