//! Query planning: decomposing an operation against the supergraph into a
//! minimal tree of subgraph fetches.
//!
//! The selection is walked top-down and grouped into fetch groups, each
//! resolvable by a single subgraph from a single entry point. Crossing into a
//! field owned by another subgraph opens an entity fetch: the current group
//! picks up `__typename` plus a key at that path, and the sub-selection
//! continues in a dependent group rooted at `_entities`. Dependent fetches
//! chain under `Sequence`; independent ones run under `Parallel`.

use apollo_compiler::ast;
use apollo_compiler::collections::IndexMap;
use apollo_compiler::collections::IndexSet;
use apollo_compiler::executable;
use apollo_compiler::executable::OperationType;
use apollo_compiler::name;
use apollo_compiler::schema::ExtendedType;
use apollo_compiler::validation::Valid;
use apollo_compiler::ExecutableDocument;
use apollo_compiler::Name;
use apollo_compiler::Node;

use crate::error::PlannerError;
use crate::fieldset;
use crate::query_plan::printer;
use crate::query_plan::printer::OpField;
use crate::query_plan::printer::OpInlineFragment;
use crate::query_plan::printer::OpSelection;
use crate::query_plan::printer::OpVariable;
use crate::query_plan::FetchNode;
use crate::query_plan::FlattenNode;
use crate::query_plan::InlineFragment;
use crate::query_plan::PlanNode;
use crate::query_plan::QueryPlan;
use crate::query_plan::QueryPlanOptions;
use crate::query_plan::ResponsePathElement;
use crate::query_plan::Selection;
use crate::supergraph::FieldResolution;
use crate::supergraph::GraphId;
use crate::supergraph::Supergraph;

/// Plans operations against one supergraph. Planning is a pure function of
/// (supergraph, operation text, operation name): callers may cache plans by
/// those inputs and share the planner freely across threads.
pub struct QueryPlanner<'a> {
    supergraph: &'a Supergraph,
}

impl<'a> QueryPlanner<'a> {
    pub fn new(supergraph: &'a Supergraph) -> Self {
        QueryPlanner { supergraph }
    }

    pub fn plan(
        &self,
        query: &str,
        operation_name: Option<&str>,
        _options: &QueryPlanOptions,
    ) -> Result<QueryPlan, PlannerError> {
        let schema = Valid::assume_valid_ref(&self.supergraph.schema);
        let document = ExecutableDocument::parse_and_validate(schema, query, "operation.graphql")
            .map_err(|err| PlannerError::InvalidOperation {
                message: err.errors.to_string(),
            })?;
        let operation =
            document
                .operations
                .get(operation_name)
                .map_err(|_| PlannerError::InvalidOperation {
                    message: match operation_name {
                        Some(name) => format!("unknown operation {name:?}"),
                        None => "the document does not contain a single anonymous operation"
                            .to_owned(),
                    },
                })?;
        tracing::trace!(
            operation = operation_name.unwrap_or("<anonymous>"),
            "building query plan"
        );

        let context = PlanningContext {
            supergraph: self.supergraph,
            document: &document,
            operation,
        };
        context.build()
    }
}

struct PlanningContext<'a> {
    supergraph: &'a Supergraph,
    document: &'a ExecutableDocument,
    operation: &'a Node<executable::Operation>,
}

/// A field occurrence under a concrete type condition.
struct ScopedField<'a> {
    scope: Name,
    field: &'a executable::Field,
}

/// Field occurrences with the same scope and response key, merged so their
/// sub-selections plan as one.
struct MergedField<'a> {
    scope: Name,
    field: &'a executable::Field,
    extra_sets: Vec<&'a executable::SelectionSet>,
}

/// A maximal sub-selection resolvable by one subgraph from one entry point:
/// the operation root, or an entity representation collected at `merge_at`.
struct FetchGroup {
    service: GraphId,
    merge_at: Vec<ResponsePathElement>,
    /// `Some` for entity fetches: the type the representations select.
    entity_type: Option<Name>,
    selections: Vec<OpSelection>,
    /// The representation selection (`__typename` + key + requires fields).
    required: Vec<OpSelection>,
    dependents: Vec<FetchGroup>,
}

impl FetchGroup {
    fn root(service: GraphId) -> Self {
        FetchGroup {
            service,
            merge_at: Vec::new(),
            entity_type: None,
            selections: Vec::new(),
            required: Vec::new(),
            dependents: Vec::new(),
        }
    }

    /// Finds or creates the dependent entity group for `(service, path,
    /// entity)`; identical entity fetches merge here instead of duplicating.
    fn dependent_index(
        &mut self,
        service: GraphId,
        merge_at: &[ResponsePathElement],
        entity: &Name,
    ) -> usize {
        if let Some(index) = self.dependents.iter().position(|group| {
            group.service == service
                && group.merge_at == merge_at
                && group.entity_type.as_ref() == Some(entity)
        }) {
            return index;
        }
        self.dependents.push(FetchGroup {
            service,
            merge_at: merge_at.to_vec(),
            entity_type: Some(entity.clone()),
            selections: Vec::new(),
            required: Vec::new(),
            dependents: Vec::new(),
        });
        self.dependents.len() - 1
    }
}

impl<'a> PlanningContext<'a> {
    fn build(&self) -> Result<QueryPlan, PlannerError> {
        let operation_type = self.operation.operation_type;
        let kind = match operation_type {
            OperationType::Query => "query",
            OperationType::Mutation => "mutation",
            OperationType::Subscription => "subscription",
        };
        let root_type = self
            .root_type_name(operation_type)
            .ok_or_else(|| PlannerError::InvalidOperation {
                message: format!("the supergraph does not support {kind} operations"),
            })?;

        let mut scoped = Vec::new();
        self.collect_fields(&root_type, &self.operation.selection_set, &mut scoped);
        let merged = merge_scoped(scoped);

        let groups = if operation_type == OperationType::Mutation {
            self.split_root_fields_serially(&root_type, merged)?
        } else {
            self.split_root_fields(&root_type, merged)?
        };

        if operation_type == OperationType::Subscription
            && (groups.len() != 1 || !groups[0].dependents.is_empty())
        {
            return Err(PlannerError::SubscriptionInMultipleSubgraphs {
                message: "subscription operations must resolve within a single subgraph"
                    .to_owned(),
            });
        }

        let nodes: Vec<PlanNode> = groups
            .into_iter()
            .map(|group| self.execution_node(group, operation_type))
            .collect();

        let node = match nodes.len() {
            0 => None,
            _ if operation_type == OperationType::Mutation => {
                Some(flat_wrap_sequence(nodes))
            }
            _ => Some(flat_wrap_parallel(nodes)),
        };
        Ok(QueryPlan { node })
    }

    fn root_type_name(&self, operation_type: OperationType) -> Option<Name> {
        let definition = &self.supergraph.schema.schema_definition;
        let root = match operation_type {
            OperationType::Query => &definition.query,
            OperationType::Mutation => &definition.mutation,
            OperationType::Subscription => &definition.subscription,
        };
        root.as_ref().map(|component| component.name.clone())
    }

    /// Expands fragment spreads and inline fragments into a flat list of
    /// fields, each scoped by its narrowest type condition. Fragments are
    /// inlined at plan time; fetch operations never reference them.
    fn collect_fields(
        &self,
        scope: &Name,
        selection_set: &'a executable::SelectionSet,
        out: &mut Vec<ScopedField<'a>>,
    ) {
        for selection in &selection_set.selections {
            match selection {
                executable::Selection::Field(field) => out.push(ScopedField {
                    scope: scope.clone(),
                    field,
                }),
                executable::Selection::InlineFragment(frag) => {
                    self.collect_fields(&frag.selection_set.ty, &frag.selection_set, out);
                }
                executable::Selection::FragmentSpread(spread) => {
                    if let Some(fragment) = self.document.fragments.get(&spread.fragment_name) {
                        self.collect_fields(
                            &fragment.selection_set.ty,
                            &fragment.selection_set,
                            out,
                        );
                    }
                }
            }
        }
    }

    /// Query/subscription root fields: one fetch group per subgraph, executed
    /// in parallel.
    fn split_root_fields(
        &self,
        root_type: &Name,
        fields: Vec<MergedField<'a>>,
    ) -> Result<Vec<FetchGroup>, PlannerError> {
        let mut groups: Vec<FetchGroup> = Vec::new();
        let mut typename_keys: Vec<Name> = Vec::new();
        for merged in fields {
            if merged.field.name == "__typename" {
                typename_keys.push(merged.field.response_key().clone());
                continue;
            }
            let service = self.root_field_service(root_type, &merged)?;
            let index = match groups.iter().position(|g| g.service == service) {
                Some(index) => index,
                None => {
                    groups.push(FetchGroup::root(service));
                    groups.len() - 1
                }
            };
            let completed = self.complete_field(&mut groups[index], &merged, &[], false)?;
            merge_selection(&mut groups[index].selections, completed);
        }
        if !typename_keys.is_empty() {
            let Some(first) = groups.first_mut() else {
                return Err(PlannerError::NoResolver {
                    message: "cannot plan an operation selecting only __typename".to_owned(),
                });
            };
            for key in typename_keys {
                let field = OpField {
                    alias: (key.as_str() != "__typename").then(|| key.clone()),
                    name: name!("__typename"),
                    arguments: Vec::new(),
                    selections: None,
                };
                merge_selection(&mut first.selections, OpSelection::Field(field));
            }
        }
        Ok(groups)
    }

    /// Mutation root fields execute in order; a new group starts whenever the
    /// owning subgraph changes from the previous field.
    fn split_root_fields_serially(
        &self,
        root_type: &Name,
        fields: Vec<MergedField<'a>>,
    ) -> Result<Vec<FetchGroup>, PlannerError> {
        let mut groups: Vec<FetchGroup> = Vec::new();
        for merged in fields {
            let service = self.root_field_service(root_type, &merged)?;
            let reuse = groups.last().is_some_and(|g| g.service == service);
            if !reuse {
                groups.push(FetchGroup::root(service));
            }
            let group = groups.last_mut().expect("pushed above");
            let completed = self.complete_field(group, &merged, &[], false)?;
            merge_selection(&mut group.selections, completed);
        }
        Ok(groups)
    }

    fn root_field_service(
        &self,
        root_type: &Name,
        merged: &MergedField<'a>,
    ) -> Result<GraphId, PlannerError> {
        match self
            .supergraph
            .metadata
            .resolution(root_type, &merged.field.name)
        {
            FieldResolution::Fixed { graph, .. } => Ok(graph),
            FieldResolution::Any => Err(PlannerError::NoResolver {
                message: format!(
                    "no subgraph resolves root field \"{}.{}\"",
                    root_type, merged.field.name
                ),
            }),
        }
    }

    /// Builds the selection for one field inside `group`, descending into its
    /// sub-selection and opening dependent groups at entity boundaries.
    fn complete_field(
        &self,
        group: &mut FetchGroup,
        merged: &MergedField<'a>,
        path: &[ResponsePathElement],
        force_local: bool,
    ) -> Result<OpSelection, PlannerError> {
        let field = merged.field;
        let ty = field.ty();
        let named = ty.inner_named_type();
        let composite = matches!(
            self.supergraph.schema.types.get(named),
            Some(ExtendedType::Object(_) | ExtendedType::Interface(_) | ExtendedType::Union(_))
        );

        if !composite || field.selection_set.selections.is_empty() {
            return Ok(OpSelection::Field(OpField {
                alias: field.alias.clone(),
                name: field.name.clone(),
                arguments: field.arguments.clone(),
                selections: None,
            }));
        }

        let mut sub_path = path.to_vec();
        sub_path.push(ResponsePathElement::Field(
            field.response_key().to_string(),
        ));
        append_list_markers(ty, &mut sub_path);

        let mut scoped = Vec::new();
        self.collect_fields(named, &field.selection_set, &mut scoped);
        for extra in &merged.extra_sets {
            self.collect_fields(named, extra, &mut scoped);
        }
        let subfields = merge_scoped(scoped);
        let selections = self.split_subfields(group, named, subfields, &sub_path, force_local)?;

        Ok(OpSelection::Field(OpField {
            alias: field.alias.clone(),
            name: field.name.clone(),
            arguments: field.arguments.clone(),
            selections: Some(selections),
        }))
    }

    /// The grouping rule: a field stays in `group` iff its subgraph matches
    /// (or it is a value-type field, or it is covered by `@provides`); any
    /// other field opens an entity fetch against its owning subgraph.
    fn split_subfields(
        &self,
        group: &mut FetchGroup,
        parent_type: &Name,
        fields: Vec<MergedField<'a>>,
        path: &[ResponsePathElement],
        force_local: bool,
    ) -> Result<Vec<OpSelection>, PlannerError> {
        // scope -> selections, assembled at the end; the parent scope inlines
        // directly, other scopes wrap in inline fragments. Representation
        // inputs collect separately so they lead each scope's selection.
        let mut by_scope: IndexMap<Name, Vec<OpSelection>> = IndexMap::default();
        let mut extras_by_scope: IndexMap<Name, Vec<OpSelection>> = IndexMap::default();

        for merged in fields {
            let scope = merged.scope.clone();
            if merged.field.name == "__typename" {
                let field = OpField {
                    alias: merged.field.alias.clone(),
                    name: name!("__typename"),
                    arguments: Vec::new(),
                    selections: None,
                };
                merge_selection(
                    by_scope.entry(scope).or_default(),
                    OpSelection::Field(field),
                );
                continue;
            }

            let resolution = if force_local {
                FieldResolution::Any
            } else {
                self.supergraph
                    .metadata
                    .resolution(&merged.scope, &merged.field.name)
            };

            match resolution {
                FieldResolution::Any => {
                    let completed = self.complete_field(group, &merged, path, force_local)?;
                    merge_selection(by_scope.entry(scope).or_default(), completed);
                }
                FieldResolution::Fixed {
                    graph, provides, ..
                } if graph == group.service => {
                    let local_subtree = provides
                        .as_deref()
                        .is_some_and(|fields| self.provides_covers(&merged, fields));
                    let completed =
                        self.complete_field(group, &merged, path, local_subtree)?;
                    merge_selection(by_scope.entry(scope).or_default(), completed);
                }
                FieldResolution::Fixed {
                    graph, requires, ..
                } => {
                    let required = self.entity_requirements(
                        group,
                        &merged,
                        graph,
                        requires.as_deref(),
                    )?;
                    // The parent fetch gathers the representation inputs at
                    // this path.
                    for selection in &required {
                        merge_selection(
                            extras_by_scope.entry(scope.clone()).or_default(),
                            selection.clone(),
                        );
                    }
                    let index = group.dependent_index(graph, path, &merged.scope);
                    let dependent = &mut group.dependents[index];
                    for selection in required {
                        merge_selection(&mut dependent.required, selection);
                    }
                    let completed = self.complete_field(dependent, &merged, path, false)?;
                    merge_selection(&mut dependent.selections, completed);
                }
            }
        }

        let mut out = Vec::new();
        let place = |scope: Name, selections: Vec<OpSelection>, out: &mut Vec<OpSelection>| {
            if scope == *parent_type {
                for selection in selections {
                    merge_selection(out, selection);
                }
            } else {
                merge_selection(
                    out,
                    OpSelection::InlineFragment(OpInlineFragment {
                        type_condition: Some(scope),
                        selections,
                    }),
                );
            }
        };
        for (scope, selections) in by_scope {
            let mut combined = extras_by_scope.shift_remove(&scope).unwrap_or_default();
            for selection in selections {
                merge_selection(&mut combined, selection);
            }
            place(scope, combined, &mut out);
        }
        for (scope, selections) in extras_by_scope {
            place(scope, selections, &mut out);
        }
        Ok(out)
    }

    /// The representation selection for an entity fetch: `__typename`, the
    /// chosen key, and any `@requires` inputs of the target field.
    fn entity_requirements(
        &self,
        group: &FetchGroup,
        merged: &MergedField<'a>,
        target: GraphId,
        requires: Option<&str>,
    ) -> Result<Vec<OpSelection>, PlannerError> {
        let entity = &merged.scope;
        if !self.supergraph.metadata.is_entity(entity) {
            return Err(PlannerError::NoResolver {
                message: format!(
                    "field \"{entity}.{}\" is resolved by another subgraph, but \"{entity}\" is not an entity",
                    merged.field.name
                ),
            });
        }

        let mut required = vec![OpSelection::Field(OpField::leaf(name!("__typename")))];
        let key = self.choose_key(entity, target, group.service)?;
        for selection in op_tree_from_selection_set(&key) {
            merge_selection(&mut required, selection);
        }

        if let Some(requires) = requires {
            let selection_set = self
                .parse_metadata_field_set(entity, requires)
                .map_err(PlannerError::internal)?;
            let walk = fieldset::walk(&self.supergraph.schema, entity, &selection_set);
            for use_ in walk.uses.iter().filter(|u| u.type_name == *entity) {
                if !self.resolvable_in(group.service, &use_.type_name, &use_.field_name) {
                    return Err(PlannerError::UnsatisfiableRequires {
                        message: format!(
                            "@requires of \"{entity}.{}\" needs \"{entity}.{}\", which is not reachable from the enclosing fetch (subgraph \"{}\")",
                            merged.field.name,
                            use_.field_name,
                            self.supergraph.metadata.graph(group.service).name,
                        ),
                    });
                }
            }
            for selection in op_tree_from_selection_set(&selection_set) {
                merge_selection(&mut required, selection);
            }
        }
        Ok(required)
    }

    /// Picks the key for an entity fetch: among the target subgraph's keys
    /// whose fields the current group can resolve, the one with the fewest
    /// fields, breaking ties by canonical text.
    fn choose_key(
        &self,
        entity: &Name,
        target: GraphId,
        current: GraphId,
    ) -> Result<executable::SelectionSet, PlannerError> {
        let join = self
            .supergraph
            .metadata
            .types
            .get(entity)
            .ok_or_else(|| PlannerError::internal(format!("\"{entity}\" has no join metadata")))?;

        let mut candidates: Vec<(usize, &str, executable::SelectionSet)> = Vec::new();
        for (graph, key) in &join.keys {
            if *graph != target {
                continue;
            }
            let selection_set = self
                .parse_metadata_field_set(entity, key)
                .map_err(PlannerError::internal)?;
            let walk = fieldset::walk(&self.supergraph.schema, entity, &selection_set);
            let resolvable = walk.missing.is_empty()
                && walk
                    .uses
                    .iter()
                    .all(|u| self.resolvable_in(current, &u.type_name, &u.field_name));
            if resolvable {
                candidates.push((fieldset::field_count(&selection_set), key, selection_set));
            }
        }
        candidates.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)));
        candidates
            .into_iter()
            .map(|(_, _, selection_set)| selection_set)
            .next()
            .ok_or_else(|| {
                PlannerError::internal(format!(
                    "no @key of \"{entity}\" in subgraph \"{}\" is resolvable from subgraph \"{}\"",
                    self.supergraph.metadata.graph(target).name,
                    self.supergraph.metadata.graph(current).name,
                ))
            })
    }

    /// Whether `service` can produce `type.field` as part of a fetch it
    /// resolves: it owns the field, the field is unowned (value type), or the
    /// field is part of `service`'s own key for that type.
    fn resolvable_in(&self, service: GraphId, type_name: &Name, field_name: &Name) -> bool {
        match self.supergraph.metadata.resolution(type_name, field_name) {
            FieldResolution::Any => true,
            FieldResolution::Fixed { graph, .. } if graph == service => true,
            FieldResolution::Fixed { .. } => self
                .supergraph
                .metadata
                .keys(type_name, service)
                .iter()
                .any(|key| {
                    self.parse_metadata_field_set(type_name, key)
                        .map(|selection_set| {
                            fieldset::walk(&self.supergraph.schema, type_name, &selection_set)
                                .uses
                                .iter()
                                .any(|u| {
                                    u.type_name == *type_name && u.field_name == *field_name
                                })
                        })
                        .unwrap_or(false)
                }),
        }
    }

    fn parse_metadata_field_set(
        &self,
        parent_type: &Name,
        source: &str,
    ) -> Result<executable::SelectionSet, String> {
        fieldset::parse(&self.supergraph.schema, parent_type, source)
            .map(|field_set| field_set.selection_set.clone())
            .map_err(|message| {
                format!("invalid field set {source:?} on \"{parent_type}\": {message}")
            })
    }

    /// Whether the client's sub-selection under a `@provides` edge is fully
    /// covered by the provided fields. On any uncovered field the provides
    /// edge is ignored entirely and a normal entity fetch is emitted.
    fn provides_covers(&self, merged: &MergedField<'a>, provides: &str) -> bool {
        let target = merged.field.ty().inner_named_type();
        let Ok(provided) = self.parse_metadata_field_set(target, provides) else {
            return false;
        };
        let mut selection_sets = vec![&merged.field.selection_set];
        selection_sets.extend(merged.extra_sets.iter().copied());
        selection_sets
            .iter()
            .all(|set| self.covered_by(target, set, &provided))
    }

    fn covered_by(
        &self,
        scope: &Name,
        selection_set: &'a executable::SelectionSet,
        provided: &executable::SelectionSet,
    ) -> bool {
        let mut scoped = Vec::new();
        self.collect_fields(scope, selection_set, &mut scoped);
        scoped.iter().all(|scoped_field| {
            let field = scoped_field.field;
            if field.name == "__typename" {
                return true;
            }
            let Some(provided_field) = find_provided(provided, &scoped_field.scope, &field.name)
            else {
                return false;
            };
            if field.selection_set.selections.is_empty() {
                return true;
            }
            let inner = field.ty().inner_named_type();
            self.covered_by(inner, &field.selection_set, &provided_field.selection_set)
        })
    }

    /// Turns a finished fetch group (and its dependents, recursively) into
    /// plan nodes.
    fn execution_node(&self, group: FetchGroup, operation_type: OperationType) -> PlanNode {
        let metadata = &self.supergraph.metadata;
        let used = collect_variable_names(&group.selections);
        let variable_usages: Vec<String> = self
            .operation
            .variables
            .iter()
            .filter(|v| used.contains(v.name.as_str()))
            .map(|v| v.name.to_string())
            .collect();
        let mut variables: Vec<OpVariable> = Vec::new();
        let is_entity_fetch = group.entity_type.is_some();
        if is_entity_fetch {
            variables.push(OpVariable::representations());
        }
        variables.extend(
            self.operation
                .variables
                .iter()
                .filter(|v| used.contains(v.name.as_str()))
                .map(|v| OpVariable::from_definition(v)),
        );

        let fetch = match &group.entity_type {
            Some(entity) => {
                let requires = vec![Selection::InlineFragment(InlineFragment {
                    type_condition: Some(entity.to_string()),
                    selections: printer::to_requires(&group.required),
                })];
                FetchNode {
                    service_name: metadata.graph(group.service).name.clone(),
                    variable_usages,
                    requires: Some(requires),
                    operation: printer::print_entity_operation(
                        &variables,
                        entity,
                        &group.selections,
                    ),
                }
            }
            None => FetchNode {
                service_name: metadata.graph(group.service).name.clone(),
                variable_usages,
                requires: None,
                operation: printer::print_root_operation(
                    operation_type,
                    &variables,
                    &group.selections,
                ),
            },
        };

        let node = if is_entity_fetch {
            PlanNode::Flatten(FlattenNode {
                path: group.merge_at.clone(),
                node: Box::new(PlanNode::Fetch(fetch)),
            })
        } else {
            PlanNode::Fetch(fetch)
        };

        if group.dependents.is_empty() {
            return node;
        }
        let children: Vec<PlanNode> = group
            .dependents
            .into_iter()
            // Entity fetches below a mutation are still plain queries.
            .map(|dependent| self.execution_node(dependent, OperationType::Query))
            .collect();
        flat_wrap_sequence(vec![node, flat_wrap_parallel(children)])
    }
}

fn merge_scoped(fields: Vec<ScopedField<'_>>) -> Vec<MergedField<'_>> {
    let mut merged: IndexMap<(Name, Name), MergedField> = IndexMap::default();
    for scoped in fields {
        let key = (scoped.scope.clone(), scoped.field.response_key().clone());
        match merged.get_mut(&key) {
            None => {
                merged.insert(
                    key,
                    MergedField {
                        scope: scoped.scope,
                        field: scoped.field,
                        extra_sets: Vec::new(),
                    },
                );
            }
            Some(existing) => {
                if !scoped.field.selection_set.selections.is_empty() {
                    existing.extra_sets.push(&scoped.field.selection_set);
                }
            }
        }
    }
    merged.into_values().collect()
}

/// Appends one `@` marker per list layer so flatten paths address every
/// element.
fn append_list_markers(ty: &ast::Type, path: &mut Vec<ResponsePathElement>) {
    match ty {
        ast::Type::List(inner) | ast::Type::NonNullList(inner) => {
            path.push(ResponsePathElement::Field("@".to_owned()));
            append_list_markers(inner, path);
        }
        ast::Type::Named(_) | ast::Type::NonNullNamed(_) => {}
    }
}

/// Adds `incoming` to `selections`, merging with an existing selection with
/// the same response key or type condition instead of duplicating it.
fn merge_selection(selections: &mut Vec<OpSelection>, incoming: OpSelection) {
    match incoming {
        OpSelection::Field(incoming_field) => {
            for existing in selections.iter_mut() {
                if let OpSelection::Field(existing_field) = existing {
                    if existing_field.response_key() == incoming_field.response_key() {
                        match (&mut existing_field.selections, incoming_field.selections) {
                            (Some(existing_sub), Some(incoming_sub)) => {
                                for sub in incoming_sub {
                                    merge_selection(existing_sub, sub);
                                }
                            }
                            (None, Some(incoming_sub)) => {
                                existing_field.selections = Some(incoming_sub);
                            }
                            _ => {}
                        }
                        return;
                    }
                }
            }
            selections.push(OpSelection::Field(incoming_field));
        }
        OpSelection::InlineFragment(incoming_frag) => {
            for existing in selections.iter_mut() {
                if let OpSelection::InlineFragment(existing_frag) = existing {
                    if existing_frag.type_condition == incoming_frag.type_condition {
                        for sub in incoming_frag.selections {
                            merge_selection(&mut existing_frag.selections, sub);
                        }
                        return;
                    }
                }
            }
            selections.push(OpSelection::InlineFragment(incoming_frag));
        }
    }
}

fn op_tree_from_selection_set(selection_set: &executable::SelectionSet) -> Vec<OpSelection> {
    selection_set
        .selections
        .iter()
        .filter_map(|selection| match selection {
            executable::Selection::Field(field) => Some(OpSelection::Field(OpField {
                alias: None,
                name: field.name.clone(),
                arguments: Vec::new(),
                selections: (!field.selection_set.selections.is_empty())
                    .then(|| op_tree_from_selection_set(&field.selection_set)),
            })),
            executable::Selection::InlineFragment(frag) => {
                Some(OpSelection::InlineFragment(OpInlineFragment {
                    type_condition: frag.type_condition.clone(),
                    selections: op_tree_from_selection_set(&frag.selection_set),
                }))
            }
            executable::Selection::FragmentSpread(_) => None,
        })
        .collect()
}

fn find_provided<'p>(
    provided: &'p executable::SelectionSet,
    scope: &Name,
    field_name: &Name,
) -> Option<&'p executable::Field> {
    for selection in &provided.selections {
        match selection {
            executable::Selection::Field(field) if field.name == *field_name => {
                return Some(field);
            }
            executable::Selection::InlineFragment(frag) => {
                let matches_scope = frag
                    .type_condition
                    .as_ref()
                    .is_none_or(|condition| condition == scope);
                if matches_scope {
                    if let Some(found) = find_provided(&frag.selection_set, scope, field_name) {
                        return Some(found);
                    }
                }
            }
            _ => {}
        }
    }
    None
}

fn collect_variable_names(selections: &[OpSelection]) -> IndexSet<String> {
    let mut names = IndexSet::default();
    collect_variable_names_inner(selections, &mut names);
    names
}

fn collect_variable_names_inner(selections: &[OpSelection], names: &mut IndexSet<String>) {
    for selection in selections {
        match selection {
            OpSelection::Field(field) => {
                for argument in &field.arguments {
                    collect_value_variables(&argument.value, names);
                }
                if let Some(sub) = &field.selections {
                    collect_variable_names_inner(sub, names);
                }
            }
            OpSelection::InlineFragment(frag) => {
                collect_variable_names_inner(&frag.selections, names);
            }
        }
    }
}

fn collect_value_variables(value: &ast::Value, names: &mut IndexSet<String>) {
    match value {
        ast::Value::Variable(name) => {
            names.insert(name.to_string());
        }
        ast::Value::List(items) => {
            for item in items {
                collect_value_variables(item, names);
            }
        }
        ast::Value::Object(fields) => {
            for (_, item) in fields {
                collect_value_variables(item, names);
            }
        }
        _ => {}
    }
}

fn flat_wrap_sequence(nodes: Vec<PlanNode>) -> PlanNode {
    let mut flattened = Vec::with_capacity(nodes.len());
    for node in nodes {
        match node {
            PlanNode::Sequence { nodes } => flattened.extend(nodes),
            other => flattened.push(other),
        }
    }
    if flattened.len() == 1 {
        flattened.into_iter().next().expect("length checked")
    } else {
        PlanNode::Sequence { nodes: flattened }
    }
}

fn flat_wrap_parallel(nodes: Vec<PlanNode>) -> PlanNode {
    let mut flattened = Vec::with_capacity(nodes.len());
    for node in nodes {
        match node {
            PlanNode::Parallel { nodes } => flattened.extend(nodes),
            other => flattened.push(other),
        }
    }
    if flattened.len() == 1 {
        flattened.into_iter().next().expect("length checked")
    } else {
        PlanNode::Parallel { nodes: flattened }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_wrap_collapses_single_nodes_and_nested_wrappers() {
        let fetch = |service: &str| {
            PlanNode::Fetch(FetchNode {
                service_name: service.to_owned(),
                variable_usages: vec![],
                requires: None,
                operation: "{x}".to_owned(),
            })
        };
        assert_eq!(flat_wrap_parallel(vec![fetch("a")]), fetch("a"));
        let nested = flat_wrap_sequence(vec![
            fetch("a"),
            PlanNode::Sequence {
                nodes: vec![fetch("b"), fetch("c")],
            },
        ]);
        assert_eq!(
            nested,
            PlanNode::Sequence {
                nodes: vec![fetch("a"), fetch("b"), fetch("c")]
            }
        );
    }

    #[test]
    fn merge_selection_deduplicates_by_response_key() {
        let mut selections = vec![OpSelection::Field(OpField::leaf(name!("upc")))];
        merge_selection(
            &mut selections,
            OpSelection::Field(OpField::leaf(name!("upc"))),
        );
        merge_selection(
            &mut selections,
            OpSelection::Field(OpField::leaf(name!("name"))),
        );
        assert_eq!(selections.len(), 2);
    }
}
