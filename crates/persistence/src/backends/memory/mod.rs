//! In-memory reference backends.
//!
//! [`MemoryPrimaryStore`] and [`MemorySearchIndex`] implement the backend
//! traits over process-local maps. Both count their calls and can be told to
//! fail the next read or write, which is how the test suite exercises
//! backend failures and call batching.

mod grammar;
mod primary;
mod search;

pub use grammar::{SearchExpr, SearchParseError, SearchParser, SearchTarget};
pub use primary::MemoryPrimaryStore;
pub use search::MemorySearchIndex;

use crate::error::BackendError;

/// Call counters and one-shot injected failures.
#[derive(Debug, Default)]
struct CallLog {
    reads: usize,
    writes: usize,
    queries: usize,
    fail_read: Option<String>,
    fail_write: Option<String>,
}

impl CallLog {
    fn read(&mut self, backend_name: &str) -> Result<(), BackendError> {
        Self::check(&mut self.fail_read, backend_name)?;
        self.reads += 1;
        Ok(())
    }

    fn write(&mut self, backend_name: &str) -> Result<(), BackendError> {
        Self::check(&mut self.fail_write, backend_name)?;
        self.writes += 1;
        Ok(())
    }

    fn query(&mut self, backend_name: &str) -> Result<(), BackendError> {
        Self::check(&mut self.fail_read, backend_name)?;
        self.queries += 1;
        Ok(())
    }

    fn check(fault: &mut Option<String>, backend_name: &str) -> Result<(), BackendError> {
        match fault.take() {
            Some(message) => Err(BackendError::Unavailable {
                backend_name: backend_name.to_string(),
                message,
            }),
            None => Ok(()),
        }
    }
}
