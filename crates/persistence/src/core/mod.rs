//! Backend client traits.
//!
//! The hybrid layer talks to its two backends through these traits:
//!
//! - [`PrimaryStore`] - keyed records with structured equality/range filters
//! - [`SearchIndex`] - documents in named indexes, queried by a textual grammar
//!
//! Both are object safe and used as `Arc<dyn ...>` by
//! [`HybridStore`](crate::hybrid::HybridStore). The in-memory implementations
//! in [`backends::memory`](crate::backends::memory) serve as reference
//! behavior and as test doubles.

mod primary;
mod search;

pub use primary::PrimaryStore;
pub use search::SearchIndex;
