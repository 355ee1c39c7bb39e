//! Query construction, analysis and compilation.
//!
//! Queries are trees of comparisons built with the builder methods on
//! [`PropertyDescriptor`](crate::schema::PropertyDescriptor):
//!
//! ```
//! use hybrid_persistence::query::{Param, Query, and, or};
//! use hybrid_persistence::schema::PropertyDescriptor;
//!
//! let name = PropertyDescriptor::text("name").max_len(50).build().unwrap();
//! let age = PropertyDescriptor::integer("age").build().unwrap();
//!
//! let query = Query::new([
//!     name.eq(Param::named("name")).unwrap(),
//!     or([age.lt(18).unwrap(), age.gt(65).unwrap()]).unwrap(),
//! ]);
//! assert_eq!(query.describe(), "AND(name = :name, (age < 18 OR age > 65))");
//! ```
//!
//! At invocation the tree is bound ([`binding`]), analyzed for backend
//! eligibility ([`analyzer`]) and compiled ([`compiler`]) into either a
//! structured primary store filter or a search index query string.

pub mod analyzer;
pub mod binding;
pub mod compiler;
mod definition;
pub mod node;

pub use analyzer::{QueryAnalysis, QueryAnalyzer, TargetBackend};
pub use binding::{BoundComparison, BoundNode, QueryArgs};
pub use compiler::PrimaryFilter;
pub use definition::{Query, QueryPlan};
pub use node::{
    Comparison, Connective, Leaf, LogicalOperator, Node, Operand, Operator, Param, and, or,
};
