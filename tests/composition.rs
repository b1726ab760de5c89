//! Composition scenarios: value types, entities, the validation pass error
//! table, and the supergraph SDL round-trip.

use federation_core::compose;
use federation_core::Subgraph;
use federation_core::Supergraph;

fn subgraph(name: &str, sdl: &str) -> Subgraph {
    Subgraph::parse(name, &format!("http://{name}"), sdl)
        .unwrap_or_else(|errors| panic!("subgraph {name} failed to parse: {errors}"))
}

fn demo_subgraphs() -> Vec<Subgraph> {
    vec![
        subgraph(
            "accounts",
            r#"
            type Query { me: User }
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
    ]
}

#[test]
fn value_types_compose_without_ownership() {
    // Scenario A: identical keyless types in two subgraphs are value types.
    let supergraph = compose(&[
        subgraph(
            "alpha",
            r#"
            type Query { a: Position }
            type Position { x: Int y: Int }
            "#,
        ),
        subgraph(
            "beta",
            r#"
            type Query { b: Position }
            type Position { x: Int y: Int }
            "#,
        ),
    ])
    .unwrap();

    let position = apollo_compiler::name!("Position");
    assert!(supergraph.metadata.types.get(&position).is_none());
    // Both root fields keep their owners; Position fields carry no joins.
    assert_eq!(supergraph.metadata.fields.len(), 2);
}

#[test]
fn demo_supergraph_composes_cleanly() {
    let supergraph = compose(&demo_subgraphs()).unwrap();

    let product = apollo_compiler::name!("Product");
    let join = &supergraph.metadata.types[&product];
    let owner = join.owner.expect("Product is an entity");
    assert_eq!(supergraph.metadata.graph(owner).name, "products");
    // products, inventory and reviews each declare the upc key.
    assert_eq!(join.keys.len(), 3);
    assert!(join.keys.iter().all(|(_, key)| key == "upc"));

    let shipping = supergraph
        .metadata
        .fields
        .get(&(product.clone(), apollo_compiler::name!("shippingEstimate")))
        .expect("shippingEstimate has join metadata");
    assert_eq!(supergraph.metadata.graph(shipping.graph).name, "inventory");
    assert_eq!(shipping.requires.as_deref(), Some("weight"));
}

#[test]
fn key_selecting_a_union_field_is_rejected() {
    // Scenario E.
    let errors = compose(&[subgraph(
        "catalog",
        r#"
        type Query { top: Product }
        type Book { id: ID }
        type Furniture { id: ID }
        union Category = Book | Furniture
        type Product @key(fields: "category") { category: Category }
        "#,
    )])
    .unwrap_err();
    assert!(
        errors.codes().contains(&"KEY_FIELDS_SELECT_INVALID_TYPE"),
        "{errors}"
    );
}

#[test]
fn key_selecting_a_list_field_is_rejected() {
    let errors = compose(&[subgraph(
        "catalog",
        r#"
        type Query { top: Product }
        type Product @key(fields: "codes") { codes: [ID] }
        "#,
    )])
    .unwrap_err();
    assert!(
        errors.codes().contains(&"KEY_FIELDS_SELECT_INVALID_TYPE"),
        "{errors}"
    );
}

#[test]
fn unused_external_is_rejected() {
    // Scenario F.
    let errors = compose(&[
        subgraph(
            "products",
            r#"
            type Query { topProducts: [Product] }
            type Product @key(fields: "upc") { upc: ID! foo: Int }
            "#,
        ),
        subgraph(
            "reviews",
            r#"
            extend type Product @key(fields: "upc") {
              upc: ID! @external
              foo: Int @external
              reviews: [String]
            }
            "#,
        ),
    ])
    .unwrap_err();
    assert_eq!(errors.codes(), ["EXTERNAL_UNUSED"]);
    let report = errors.to_graphql_errors();
    assert!(report[0].message.contains("Product.foo"), "{errors}");
    assert!(!report[0].locations.is_empty());
}

#[test]
fn external_type_mismatch_is_rejected() {
    let errors = compose(&[
        subgraph(
            "products",
            r#"
            type Query { topProducts: [Product] }
            type Product @key(fields: "upc") { upc: ID! }
            "#,
        ),
        subgraph(
            "reviews",
            r#"
            extend type Product @key(fields: "upc") {
              upc: String @external
              reviews: [String]
            }
            "#,
        ),
    ])
    .unwrap_err();
    assert!(errors.codes().contains(&"EXTERNAL_TYPE_MISMATCH"), "{errors}");
}

#[test]
fn external_and_key_fields_must_exist_on_base() {
    let errors = compose(&[
        subgraph(
            "products",
            r#"
            type Query { topProducts: [Product] }
            type Product @key(fields: "upc") { upc: ID! }
            "#,
        ),
        subgraph(
            "reviews",
            r#"
            extend type Product @key(fields: "sku") {
              sku: ID! @external
              reviews: [String]
            }
            "#,
        ),
    ])
    .unwrap_err();
    let codes = errors.codes();
    assert!(codes.contains(&"EXTERNAL_MISSING_ON_BASE"), "{errors}");
    assert!(codes.contains(&"KEY_FIELDS_MISSING_ON_BASE"), "{errors}");
}

#[test]
fn requires_fields_must_be_external() {
    let errors = compose(&[
        subgraph(
            "products",
            r#"
            type Query { topProducts: [Product] }
            type Product @key(fields: "upc") { upc: ID! weight: Int }
            "#,
        ),
        subgraph(
            "inventory",
            r#"
            extend type Product @key(fields: "upc") {
              upc: ID! @external
              weight: Int
              shippingEstimate: Int @requires(fields: "weight")
            }
            "#,
        ),
    ])
    .unwrap_err();
    assert!(
        errors.codes().contains(&"REQUIRES_FIELDS_MISSING_EXTERNAL"),
        "{errors}"
    );
}

#[test]
fn provides_fields_must_be_external() {
    let errors = compose(&[
        subgraph(
            "accounts",
            r#"
            type Query { me: User }
            type User @key(fields: "id") { id: ID! username: String }
            "#,
        ),
        subgraph(
            "reviews",
            r#"
            type Query { reviews: [Review] }
            type Review { author: User @provides(fields: "username") }
            extend type User @key(fields: "id") {
              id: ID! @external
              reviews: [Review]
            }
            "#,
        ),
    ])
    .unwrap_err();
    assert!(
        errors.codes().contains(&"PROVIDES_FIELDS_MISSING_EXTERNAL"),
        "{errors}"
    );
}

#[test]
fn provides_must_target_an_entity() {
    let errors = compose(&[
        subgraph(
            "accounts",
            r#"
            type Query { me: User }
            type User { id: ID username: String }
            "#,
        ),
        subgraph(
            "reviews",
            r#"
            type Query { reviews: [Review] }
            type Review { author: User @provides(fields: "username") }
            "#,
        ),
    ])
    .unwrap_err();
    assert!(errors.codes().contains(&"PROVIDES_NOT_ON_ENTITY"), "{errors}");
}

#[test]
fn value_type_with_key_is_rejected() {
    let errors = compose(&[
        subgraph(
            "alpha",
            r#"
            type Query { a: Position }
            type Position @key(fields: "x") { x: Int y: Int }
            "#,
        ),
        subgraph(
            "beta",
            r#"
            type Query { b: Position }
            type Position { x: Int y: Int }
            "#,
        ),
    ])
    .unwrap_err();
    assert!(errors.codes().contains(&"VALUE_TYPE_NO_ENTITY"), "{errors}");
}

#[test]
fn union_value_types_must_agree() {
    let errors = compose(&[
        subgraph(
            "alpha",
            r#"
            type Query { a: Thing }
            type Book { id: ID }
            type Furniture { id: ID }
            union Thing = Book | Furniture
            "#,
        ),
        subgraph(
            "beta",
            r#"
            type Query { b: Thing }
            type Book { id: ID }
            union Thing = Book
            "#,
        ),
    ])
    .unwrap_err();
    assert!(
        errors.codes().contains(&"VALUE_TYPE_UNION_TYPES_IDENTICAL"),
        "{errors}"
    );
}

#[test]
fn value_type_field_shapes_must_agree() {
    let errors = compose(&[
        subgraph(
            "alpha",
            r#"
            type Query { a: Position }
            type Position { x: Int }
            "#,
        ),
        subgraph(
            "beta",
            r#"
            type Query { b: Position }
            type Position { x: String }
            "#,
        ),
    ])
    .unwrap_err();
    assert!(
        errors.codes().contains(&"VALUE_TYPE_FIELD_TYPE_MISMATCH"),
        "{errors}"
    );
}

#[test]
fn entities_have_exactly_one_owner() {
    let errors = compose(&[
        subgraph(
            "alpha",
            r#"
            type Query { a: Product }
            type Product @key(fields: "upc") { upc: ID! }
            "#,
        ),
        subgraph(
            "beta",
            r#"
            type Query { b: Product }
            type Product @key(fields: "upc") { upc: ID! }
            "#,
        ),
    ])
    .unwrap_err();
    assert!(
        errors.codes().contains(&"ENTITY_OWNERSHIP_CONFLICT"),
        "{errors}"
    );
}

#[test]
fn errors_are_aggregated_across_passes() {
    // One run reports both the unused external and the mismatched type.
    let errors = compose(&[
        subgraph(
            "products",
            r#"
            type Query { topProducts: [Product] }
            type Product @key(fields: "upc") { upc: ID! }
            "#,
        ),
        subgraph(
            "reviews",
            r#"
            extend type Product @key(fields: "upc") {
              upc: String @external
              dead: Int @external
              reviews: [String]
            }
            "#,
        ),
    ])
    .unwrap_err();
    let codes = errors.codes();
    assert!(codes.contains(&"EXTERNAL_UNUSED"), "{errors}");
    assert!(codes.contains(&"EXTERNAL_TYPE_MISMATCH"), "{errors}");
    assert!(codes.len() >= 2);
}

#[test]
fn supergraph_sdl_round_trips() {
    let supergraph = compose(&demo_subgraphs()).unwrap();
    let sdl = supergraph.to_sdl();

    assert!(sdl.contains("join__Graph"), "{sdl}");
    assert!(sdl.contains("@join__owner"), "{sdl}");
    assert!(sdl.contains("PRODUCTS"), "{sdl}");
    assert!(sdl.contains("https://specs.apollo.dev/join/v0.1"), "{sdl}");

    let parsed = Supergraph::parse(&sdl).unwrap();
    assert_eq!(parsed.metadata, supergraph.metadata);

    // Building again from the parsed supergraph is stable.
    let rebuilt = parsed.to_sdl();
    let reparsed = Supergraph::parse(&rebuilt).unwrap();
    assert_eq!(reparsed.metadata, supergraph.metadata);
}

#[test]
fn api_schema_hides_the_join_machinery() {
    let supergraph = compose(&demo_subgraphs()).unwrap();
    let parsed = Supergraph::parse(&supergraph.to_sdl()).unwrap();
    let api = parsed.to_api_schema().to_string();
    assert!(!api.contains("join__"), "{api}");
    assert!(!api.contains("@core"), "{api}");
    assert!(api.contains("topProducts"), "{api}");
}
