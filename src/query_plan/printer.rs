//! The planner's working selection tree and the compact operation printer.
//!
//! Fetch operations are rendered minified (`query($upc:String!){product(upc:$upc){upc}}`);
//! the exact byte form is part of plan determinism and locked by tests.

use apollo_compiler::ast;
use apollo_compiler::executable::OperationType;
use apollo_compiler::Name;
use apollo_compiler::Node;

use crate::query_plan;

/// A selection being assembled into some fetch group. Mirrors the plan
/// model's selections but keeps argument nodes so operations can be printed.
#[derive(Debug, Clone)]
pub(crate) enum OpSelection {
    Field(OpField),
    InlineFragment(OpInlineFragment),
}

#[derive(Debug, Clone)]
pub(crate) struct OpField {
    pub(crate) alias: Option<Name>,
    pub(crate) name: Name,
    pub(crate) arguments: Vec<Node<ast::Argument>>,
    pub(crate) selections: Option<Vec<OpSelection>>,
}

#[derive(Debug, Clone)]
pub(crate) struct OpInlineFragment {
    pub(crate) type_condition: Option<Name>,
    pub(crate) selections: Vec<OpSelection>,
}

impl OpField {
    pub(crate) fn leaf(name: Name) -> Self {
        OpField {
            alias: None,
            name,
            arguments: Vec::new(),
            selections: None,
        }
    }

    pub(crate) fn response_key(&self) -> &Name {
        self.alias.as_ref().unwrap_or(&self.name)
    }
}

/// A variable definition owned by a fetch operation.
#[derive(Debug, Clone)]
pub(crate) struct OpVariable {
    pub(crate) name: String,
    /// Rendered type, e.g. `[_Any!]!`.
    pub(crate) ty: String,
    pub(crate) default: Option<String>,
}

impl OpVariable {
    pub(crate) fn from_definition(definition: &ast::VariableDefinition) -> Self {
        OpVariable {
            name: definition.name.to_string(),
            ty: print_type(&definition.ty),
            default: definition
                .default_value
                .as_ref()
                .map(|value| print_value(value)),
        }
    }

    pub(crate) fn representations() -> Self {
        OpVariable {
            name: "representations".to_owned(),
            ty: "[_Any!]!".to_owned(),
            default: None,
        }
    }
}

/// Prints a fetch operation rooted at the supergraph's own root type.
pub(crate) fn print_root_operation(
    operation_type: OperationType,
    variables: &[OpVariable],
    selections: &[OpSelection],
) -> String {
    let mut out = String::new();
    match operation_type {
        OperationType::Query if variables.is_empty() => {}
        OperationType::Query => out.push_str("query"),
        OperationType::Mutation => out.push_str("mutation"),
        OperationType::Subscription => out.push_str("subscription"),
    }
    print_variable_definitions(variables, &mut out);
    print_selection_set(selections, &mut out);
    out
}

/// Prints an entity fetch: `_entities(representations:$representations)`
/// narrowed to the entity type.
pub(crate) fn print_entity_operation(
    variables: &[OpVariable],
    entity_type: &Name,
    selections: &[OpSelection],
) -> String {
    let mut out = String::from("query");
    print_variable_definitions(variables, &mut out);
    out.push_str("{_entities(representations:$representations){...on ");
    out.push_str(entity_type);
    print_selection_set(selections, &mut out);
    out.push_str("}}");
    out
}

fn print_variable_definitions(variables: &[OpVariable], out: &mut String) {
    if variables.is_empty() {
        return;
    }
    out.push('(');
    for (index, variable) in variables.iter().enumerate() {
        if index > 0 {
            out.push(',');
        }
        out.push('$');
        out.push_str(&variable.name);
        out.push(':');
        out.push_str(&variable.ty);
        if let Some(default) = &variable.default {
            out.push('=');
            out.push_str(default);
        }
    }
    out.push(')');
}

pub(crate) fn print_selection_set(selections: &[OpSelection], out: &mut String) {
    out.push('{');
    let mut first = true;
    for selection in selections {
        if !first {
            out.push(' ');
        }
        first = false;
        match selection {
            OpSelection::Field(field) => {
                if let Some(alias) = &field.alias {
                    out.push_str(alias);
                    out.push(':');
                }
                out.push_str(&field.name);
                print_arguments(&field.arguments, out);
                if let Some(sub) = &field.selections {
                    print_selection_set(sub, out);
                }
            }
            OpSelection::InlineFragment(frag) => {
                out.push_str("...");
                if let Some(condition) = &frag.type_condition {
                    out.push_str("on ");
                    out.push_str(condition);
                }
                print_selection_set(&frag.selections, out);
            }
        }
    }
    out.push('}');
}

fn print_arguments(arguments: &[Node<ast::Argument>], out: &mut String) {
    if arguments.is_empty() {
        return;
    }
    out.push('(');
    for (index, argument) in arguments.iter().enumerate() {
        if index > 0 {
            out.push(',');
        }
        out.push_str(&argument.name);
        out.push(':');
        out.push_str(&print_value(&argument.value));
    }
    out.push(')');
}

pub(crate) fn print_type(ty: &ast::Type) -> String {
    match ty {
        ast::Type::Named(name) => name.to_string(),
        ast::Type::NonNullNamed(name) => format!("{name}!"),
        ast::Type::List(inner) => format!("[{}]", print_type(inner)),
        ast::Type::NonNullList(inner) => format!("[{}]!", print_type(inner)),
    }
}

pub(crate) fn print_value(value: &ast::Value) -> String {
    match value {
        ast::Value::Null => "null".to_owned(),
        ast::Value::Enum(name) => name.to_string(),
        ast::Value::Variable(name) => format!("${name}"),
        ast::Value::String(text) => print_string(text),
        ast::Value::Float(float) => float.as_str().to_owned(),
        ast::Value::Int(int) => int.as_str().to_owned(),
        ast::Value::Boolean(true) => "true".to_owned(),
        ast::Value::Boolean(false) => "false".to_owned(),
        ast::Value::List(items) => {
            let items: Vec<String> = items.iter().map(|item| print_value(item)).collect();
            format!("[{}]", items.join(","))
        }
        ast::Value::Object(fields) => {
            let fields: Vec<String> = fields
                .iter()
                .map(|(name, value)| format!("{name}:{}", print_value(value)))
                .collect();
            format!("{{{}}}", fields.join(","))
        }
    }
}

fn print_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Converts the working tree into the plan model's argument-free selection
/// shape, used for the `requires` of entity fetches.
pub(crate) fn to_requires(selections: &[OpSelection]) -> query_plan::SelectionSet {
    selections
        .iter()
        .map(|selection| match selection {
            OpSelection::Field(field) => query_plan::Selection::Field(query_plan::Field {
                alias: field.alias.as_ref().map(ToString::to_string),
                name: field.name.to_string(),
                selections: field.selections.as_deref().map(to_requires),
            }),
            OpSelection::InlineFragment(frag) => {
                query_plan::Selection::InlineFragment(query_plan::InlineFragment {
                    type_condition: frag.type_condition.as_ref().map(ToString::to_string),
                    selections: to_requires(&frag.selections),
                })
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use apollo_compiler::name;

    #[test]
    fn prints_minified_operations() {
        let selections = vec![OpSelection::Field(OpField {
            alias: None,
            name: name!("product"),
            arguments: vec![Node::new(ast::Argument {
                name: name!("upc"),
                value: Node::new(ast::Value::Variable(name!("upc"))),
            })],
            selections: Some(vec![
                OpSelection::Field(OpField::leaf(name!("upc"))),
                OpSelection::Field(OpField::leaf(name!("name"))),
            ]),
        })];
        let variables = vec![OpVariable {
            name: "upc".to_owned(),
            ty: "String!".to_owned(),
            default: None,
        }];
        assert_eq!(
            print_root_operation(OperationType::Query, &variables, &selections),
            "query($upc:String!){product(upc:$upc){upc name}}"
        );
        assert_eq!(
            print_root_operation(OperationType::Query, &[], &selections[..1].to_vec()),
            "{product(upc:$upc){upc name}}"
        );
    }

    #[test]
    fn prints_entity_operations() {
        let selections = vec![OpSelection::Field(OpField {
            alias: None,
            name: name!("reviews"),
            arguments: Vec::new(),
            selections: Some(vec![OpSelection::Field(OpField::leaf(name!("body")))]),
        })];
        assert_eq!(
            print_entity_operation(
                &[OpVariable::representations()],
                &name!("Product"),
                &selections
            ),
            "query($representations:[_Any!]!){_entities(representations:$representations){...on Product{reviews{body}}}}"
        );
    }
}
