//! Composition and query planning core for a federated GraphQL gateway.
//!
//! Independent subgraph schemas are merged into a single supergraph schema
//! with routing metadata ([`compose`]), rendered to and from a portable SDL
//! form annotated with `@core`/`@join__*` directives ([`Supergraph`]), and
//! client operations are decomposed into executable trees of subgraph
//! fetches with entity-join steps ([`QueryPlanner`]).
//!
//! The crate is purely functional: no I/O, no shared mutable state, no
//! internal concurrency. Composed supergraphs and plans are immutable, so a
//! gateway can share them across any number of concurrent executions.
//! Transport, plan execution, and caching are the host's concern.
//!
//! ```
//! use federation_core::{compose, QueryPlanner, QueryPlanOptions, Subgraph};
//!
//! let products = Subgraph::parse(
//!     "products",
//!     "http://products",
//!     r#"
//!     type Query { topProducts: [Product] }
//!     type Product @key(fields: "upc") { upc: ID! name: String }
//!     "#,
//! )
//! .unwrap();
//! let reviews = Subgraph::parse(
//!     "reviews",
//!     "http://reviews",
//!     r#"
//!     extend type Product @key(fields: "upc") {
//!       upc: ID! @external
//!       reviews: [Review]
//!     }
//!     type Review { body: String }
//!     "#,
//! )
//! .unwrap();
//!
//! let supergraph = compose(&[products, reviews]).unwrap();
//! let planner = QueryPlanner::new(&supergraph);
//! let plan = planner
//!     .plan(
//!         "{ topProducts { upc name reviews { body } } }",
//!         None,
//!         &QueryPlanOptions::default(),
//!     )
//!     .unwrap();
//! assert!(plan.node.is_some());
//! ```

pub mod compose;
pub mod error;
mod fieldset;
pub mod query_plan;
pub mod subgraph;
pub mod supergraph;

pub use crate::compose::compose;
pub use crate::error::CompositionError;
pub use crate::error::CompositionErrors;
pub use crate::error::GraphQLError;
pub use crate::error::PlannerError;
pub use crate::error::SupergraphError;
pub use crate::query_plan::QueryPlan;
pub use crate::query_plan::QueryPlanOptions;
pub use crate::query_plan::QueryPlanner;
pub use crate::subgraph::Subgraph;
pub use crate::supergraph::Supergraph;
