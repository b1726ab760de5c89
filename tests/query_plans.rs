//! Query planning scenarios: entity fan-out, requires, provides, serial
//! mutations, variables, and plan determinism.

use federation_core::compose;
use federation_core::QueryPlanOptions;
use federation_core::QueryPlanner;
use federation_core::Subgraph;
use federation_core::Supergraph;
use serde_json::json;

fn subgraph(name: &str, sdl: &str) -> Subgraph {
    Subgraph::parse(name, &format!("http://{name}"), sdl)
        .unwrap_or_else(|errors| panic!("subgraph {name} failed to parse: {errors}"))
}

fn demo_supergraph() -> Supergraph {
    compose(&[
        subgraph(
            "accounts",
            r#"
            type Query { me: User }
            type Mutation { createUser(name: String): User }
            type User @key(fields: "id") {
              id: ID!
              username: String
              name: String
            }
            "#,
        ),
        subgraph(
            "products",
            r#"
            type Query { topProducts(first: Int): [Product] }
            type Mutation { createProduct(upc: ID!): Product }
            type Subscription { productUpdated: Product }
            type Product @key(fields: "upc") {
              upc: ID!
              name: String
              price: Int
              weight: Int
            }
            "#,
        ),
        subgraph(
            "inventory",
            r#"
            extend type Product @key(fields: "upc") {
              upc: ID! @external
              weight: Int @external
              shippingEstimate: Int @requires(fields: "weight")
              inStock: Boolean
            }
            "#,
        ),
        subgraph(
            "reviews",
            r#"
            type Query { reviews: [Review] }
            type Subscription { reviewAdded: Review }
            type Review {
              id: ID!
              body: String
              author: User @provides(fields: "username")
              product: Product
            }
            extend type User @key(fields: "id") {
              id: ID! @external
              username: String @external
              reviews: [Review]
            }
            extend type Product @key(fields: "upc") {
              upc: ID! @external
              reviews: [Review]
            }
            "#,
        ),
    ])
    .unwrap_or_else(|errors| panic!("composition failed: {errors}"))
}

fn plan_json(supergraph: &Supergraph, query: &str) -> serde_json::Value {
    let planner = QueryPlanner::new(supergraph);
    planner
        .plan(query, None, &QueryPlanOptions::default())
        .unwrap_or_else(|err| panic!("planning failed: {err}"))
        .into_json()
}

#[test]
fn entity_fan_out_plans_a_sequence_with_flatten() {
    // Scenario B.
    let supergraph = demo_supergraph();
    assert_eq!(
        plan_json(&supergraph, "{ topProducts { upc name reviews { body } } }"),
        json!({
            "kind": "QueryPlan",
            "node": {
                "kind": "Sequence",
                "nodes": [
                    {
                        "kind": "Fetch",
                        "serviceName": "products",
                        "variableUsages": [],
                        "operation": "{topProducts{__typename upc name}}"
                    },
                    {
                        "kind": "Flatten",
                        "path": ["topProducts", "@"],
                        "node": {
                            "kind": "Fetch",
                            "serviceName": "reviews",
                            "variableUsages": [],
                            "requires": [
                                {
                                    "kind": "InlineFragment",
                                    "typeCondition": "Product",
                                    "selections": [
                                        { "kind": "Field", "name": "__typename" },
                                        { "kind": "Field", "name": "upc" }
                                    ]
                                }
                            ],
                            "operation": "query($representations:[_Any!]!){_entities(representations:$representations){...on Product{reviews{body}}}}"
                        }
                    }
                ]
            }
        })
    );
}

#[test]
fn requires_fields_are_fetched_before_the_dependent_field() {
    // Scenario C: weight is gathered by the products fetch and shipped in
    // the representations of the inventory fetch.
    let supergraph = demo_supergraph();
    assert_eq!(
        plan_json(&supergraph, "{ topProducts { upc shippingEstimate } }"),
        json!({
            "kind": "QueryPlan",
            "node": {
                "kind": "Sequence",
                "nodes": [
                    {
                        "kind": "Fetch",
                        "serviceName": "products",
                        "variableUsages": [],
                        "operation": "{topProducts{__typename upc weight}}"
                    },
                    {
                        "kind": "Flatten",
                        "path": ["topProducts", "@"],
                        "node": {
                            "kind": "Fetch",
                            "serviceName": "inventory",
                            "variableUsages": [],
                            "requires": [
                                {
                                    "kind": "InlineFragment",
                                    "typeCondition": "Product",
                                    "selections": [
                                        { "kind": "Field", "name": "__typename" },
                                        { "kind": "Field", "name": "upc" },
                                        { "kind": "Field", "name": "weight" }
                                    ]
                                }
                            ],
                            "operation": "query($representations:[_Any!]!){_entities(representations:$representations){...on Product{shippingEstimate}}}"
                        }
                    }
                ]
            }
        })
    );
}

#[test]
fn provides_avoids_the_entity_round_trip() {
    // Scenario D: username is provided by the reviews subgraph.
    let supergraph = demo_supergraph();
    assert_eq!(
        plan_json(&supergraph, "{ reviews { author { username } } }"),
        json!({
            "kind": "QueryPlan",
            "node": {
                "kind": "Fetch",
                "serviceName": "reviews",
                "variableUsages": [],
                "operation": "{reviews{author{username}}}"
            }
        })
    );
}

#[test]
fn provides_falls_back_when_selection_exceeds_the_provided_fields() {
    // `name` is not provided, so the whole author sub-selection goes through
    // a normal entity fetch against accounts.
    let supergraph = demo_supergraph();
    assert_eq!(
        plan_json(&supergraph, "{ reviews { author { username name } } }"),
        json!({
            "kind": "QueryPlan",
            "node": {
                "kind": "Sequence",
                "nodes": [
                    {
                        "kind": "Fetch",
                        "serviceName": "reviews",
                        "variableUsages": [],
                        "operation": "{reviews{author{__typename id}}}"
                    },
                    {
                        "kind": "Flatten",
                        "path": ["reviews", "@", "author"],
                        "node": {
                            "kind": "Fetch",
                            "serviceName": "accounts",
                            "variableUsages": [],
                            "requires": [
                                {
                                    "kind": "InlineFragment",
                                    "typeCondition": "User",
                                    "selections": [
                                        { "kind": "Field", "name": "__typename" },
                                        { "kind": "Field", "name": "id" }
                                    ]
                                }
                            ],
                            "operation": "query($representations:[_Any!]!){_entities(representations:$representations){...on User{username name}}}"
                        }
                    }
                ]
            }
        })
    );
}

#[test]
fn entity_fetch_from_within_an_entity_group() {
    let supergraph = demo_supergraph();
    assert_eq!(
        plan_json(&supergraph, "{ me { reviews { body } } }"),
        json!({
            "kind": "QueryPlan",
            "node": {
                "kind": "Sequence",
                "nodes": [
                    {
                        "kind": "Fetch",
                        "serviceName": "accounts",
                        "variableUsages": [],
                        "operation": "{me{__typename id}}"
                    },
                    {
                        "kind": "Flatten",
                        "path": ["me"],
                        "node": {
                            "kind": "Fetch",
                            "serviceName": "reviews",
                            "variableUsages": [],
                            "requires": [
                                {
                                    "kind": "InlineFragment",
                                    "typeCondition": "User",
                                    "selections": [
                                        { "kind": "Field", "name": "__typename" },
                                        { "kind": "Field", "name": "id" }
                                    ]
                                }
                            ],
                            "operation": "query($representations:[_Any!]!){_entities(representations:$representations){...on User{reviews{body}}}}"
                        }
                    }
                ]
            }
        })
    );
}

#[test]
fn independent_root_fields_run_in_parallel() {
    let supergraph = demo_supergraph();
    assert_eq!(
        plan_json(&supergraph, "{ topProducts { upc } me { username } }"),
        json!({
            "kind": "QueryPlan",
            "node": {
                "kind": "Parallel",
                "nodes": [
                    {
                        "kind": "Fetch",
                        "serviceName": "products",
                        "variableUsages": [],
                        "operation": "{topProducts{upc}}"
                    },
                    {
                        "kind": "Fetch",
                        "serviceName": "accounts",
                        "variableUsages": [],
                        "operation": "{me{username}}"
                    }
                ]
            }
        })
    );
}

#[test]
fn mutation_root_fields_execute_serially() {
    let supergraph = demo_supergraph();
    assert_eq!(
        plan_json(
            &supergraph,
            r#"mutation { createProduct(upc: "1") { upc } createUser(name: "u") { username } }"#
        ),
        json!({
            "kind": "QueryPlan",
            "node": {
                "kind": "Sequence",
                "nodes": [
                    {
                        "kind": "Fetch",
                        "serviceName": "products",
                        "variableUsages": [],
                        "operation": "mutation{createProduct(upc:\"1\"){upc}}"
                    },
                    {
                        "kind": "Fetch",
                        "serviceName": "accounts",
                        "variableUsages": [],
                        "operation": "mutation{createUser(name:\"u\"){username}}"
                    }
                ]
            }
        })
    );
}

#[test]
fn variables_are_forwarded_only_to_the_fetches_that_use_them() {
    let supergraph = demo_supergraph();
    let planner = QueryPlanner::new(&supergraph);
    let plan = planner
        .plan(
            "query GetTop($first: Int) { topProducts(first: $first) { upc reviews { body } } }",
            Some("GetTop"),
            &QueryPlanOptions::default(),
        )
        .unwrap();
    assert_eq!(
        plan.into_json(),
        json!({
            "kind": "QueryPlan",
            "node": {
                "kind": "Sequence",
                "nodes": [
                    {
                        "kind": "Fetch",
                        "serviceName": "products",
                        "variableUsages": ["first"],
                        "operation": "query($first:Int){topProducts(first:$first){__typename upc}}"
                    },
                    {
                        "kind": "Flatten",
                        "path": ["topProducts", "@"],
                        "node": {
                            "kind": "Fetch",
                            "serviceName": "reviews",
                            "variableUsages": [],
                            "requires": [
                                {
                                    "kind": "InlineFragment",
                                    "typeCondition": "Product",
                                    "selections": [
                                        { "kind": "Field", "name": "__typename" },
                                        { "kind": "Field", "name": "upc" }
                                    ]
                                }
                            ],
                            "operation": "query($representations:[_Any!]!){_entities(representations:$representations){...on Product{reviews{body}}}}"
                        }
                    }
                ]
            }
        })
    );
}

#[test]
fn fragments_are_inlined_at_plan_time() {
    let supergraph = demo_supergraph();
    let spread = plan_json(
        &supergraph,
        "query { topProducts { ...Names } } fragment Names on Product { upc name }",
    );
    let inline = plan_json(&supergraph, "{ topProducts { upc name } }");
    assert_eq!(spread, inline);
}

#[test]
fn plans_are_deterministic() {
    let supergraph = demo_supergraph();
    let query = "{ topProducts { upc name reviews { body author { username } } } }";
    let planner = QueryPlanner::new(&supergraph);
    let first = planner
        .plan(query, None, &QueryPlanOptions::default())
        .unwrap();
    let second = planner
        .plan(query, None, &QueryPlanOptions::default())
        .unwrap();
    assert_eq!(first, second);
    assert_eq!(first.to_string(), second.to_string());
    assert_eq!(first.clone().into_json(), second.clone().into_json());
}

#[test]
fn plan_renders_as_an_indented_tree() {
    let supergraph = demo_supergraph();
    let planner = QueryPlanner::new(&supergraph);
    let plan = planner
        .plan(
            "{ topProducts { upc reviews { body } } }",
            None,
            &QueryPlanOptions::default(),
        )
        .unwrap();
    let rendered = plan.to_string();
    assert!(rendered.starts_with("QueryPlan {"), "{rendered}");
    assert!(
        rendered.contains("Flatten(path: \"topProducts.@\")"),
        "{rendered}"
    );
    assert!(rendered.contains("Fetch(service: \"reviews\")"), "{rendered}");
}

#[test]
fn unreachable_requires_is_a_plan_time_error() {
    // Entering Product from reviews cannot supply `weight`, which only the
    // products subgraph resolves.
    let supergraph = demo_supergraph();
    let planner = QueryPlanner::new(&supergraph);
    let err = planner
        .plan(
            "{ reviews { product { shippingEstimate } } }",
            None,
            &QueryPlanOptions::default(),
        )
        .unwrap_err();
    assert_eq!(err.code(), "UNSATISFIABLE_REQUIRES");
}

#[test]
fn single_subgraph_subscriptions_are_allowed() {
    let supergraph = demo_supergraph();
    assert_eq!(
        plan_json(&supergraph, "subscription { reviewAdded { body } }"),
        json!({
            "kind": "QueryPlan",
            "node": {
                "kind": "Fetch",
                "serviceName": "reviews",
                "variableUsages": [],
                "operation": "subscription{reviewAdded{body}}"
            }
        })
    );
}

#[test]
fn cross_subgraph_subscriptions_are_rejected() {
    let supergraph = demo_supergraph();
    let planner = QueryPlanner::new(&supergraph);
    // A single root field whose sub-selection needs another subgraph still
    // cannot be a subscription.
    let err = planner
        .plan(
            "subscription { productUpdated { upc reviews { body } } }",
            None,
            &QueryPlanOptions::default(),
        )
        .unwrap_err();
    assert_eq!(err.code(), "SUBSCRIPTION_IN_MULTIPLE_SUBGRAPHS");
}

#[test]
fn missing_join_metadata_surfaces_as_no_resolver() {
    // A hand-mangled supergraph without @join__field on its root field.
    let supergraph = Supergraph::parse(
        r#"
        schema
          @core(feature: "https://specs.apollo.dev/core/v0.1")
          @core(feature: "https://specs.apollo.dev/join/v0.1")
        { query: Query }

        directive @core(feature: String!) repeatable on SCHEMA
        directive @join__graph(name: String!, url: String!) on ENUM_VALUE

        enum join__Graph {
          PRODUCTS @join__graph(name: "products", url: "http://products")
        }

        type Query { topProducts: [Product] }
        type Product { upc: ID }
        "#,
    )
    .unwrap();
    let planner = QueryPlanner::new(&supergraph);
    let err = planner
        .plan("{ topProducts { upc } }", None, &QueryPlanOptions::default())
        .unwrap_err();
    assert_eq!(err.code(), "NO_RESOLVER");
}

#[test]
fn plans_survive_the_supergraph_sdl_round_trip() {
    let supergraph = demo_supergraph();
    let reparsed = Supergraph::parse(&supergraph.to_sdl()).unwrap();
    let query = "{ topProducts { upc shippingEstimate reviews { body } } }";
    assert_eq!(plan_json(&supergraph, query), plan_json(&reparsed, query));
}
