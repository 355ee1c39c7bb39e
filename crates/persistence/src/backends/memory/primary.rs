//! In-memory primary store.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::trace;

use super::CallLog;
use crate::core::PrimaryStore;
use crate::error::BackendError;
use crate::query::{Operator, PrimaryFilter};
use crate::types::{EntityKey, FieldMap, FieldValue, PrimaryRecord};

const BACKEND_NAME: &str = "memory-primary";

#[derive(Debug, Default)]
struct PrimaryState {
    records: BTreeMap<EntityKey, FieldMap>,
    calls: CallLog,
}

/// A primary store over an ordered map.
///
/// Queries enforce the primary store's restriction of inequality filters to
/// a single field and return records ordered by key.
#[derive(Debug, Default)]
pub struct MemoryPrimaryStore {
    state: Mutex<PrimaryState>,
}

impl MemoryPrimaryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `get_multi` calls.
    pub fn read_count(&self) -> usize {
        self.state.lock().calls.reads
    }

    /// Number of successful `put_multi` and `delete_multi` calls.
    pub fn write_count(&self) -> usize {
        self.state.lock().calls.writes
    }

    /// Number of successful `query` calls.
    pub fn query_count(&self) -> usize {
        self.state.lock().calls.queries
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.state.lock().records.is_empty()
    }

    /// The record stored under `key`, bypassing the call counters.
    pub fn record(&self, key: &EntityKey) -> Option<PrimaryRecord> {
        self.state
            .lock()
            .records
            .get(key)
            .map(|fields| PrimaryRecord::new(key.clone(), fields.clone()))
    }

    /// Makes the next write call fail as unavailable.
    pub fn fail_next_write(&self, message: impl Into<String>) {
        self.state.lock().calls.fail_write = Some(message.into());
    }

    /// Makes the next read or query call fail as unavailable.
    pub fn fail_next_read(&self, message: impl Into<String>) {
        self.state.lock().calls.fail_read = Some(message.into());
    }
}

#[async_trait]
impl PrimaryStore for MemoryPrimaryStore {
    fn backend_name(&self) -> &'static str {
        BACKEND_NAME
    }

    async fn get_multi(
        &self,
        keys: &[EntityKey],
    ) -> Result<Vec<Option<PrimaryRecord>>, BackendError> {
        let mut state = self.state.lock();
        state.calls.read(BACKEND_NAME)?;
        Ok(keys
            .iter()
            .map(|key| {
                state
                    .records
                    .get(key)
                    .map(|fields| PrimaryRecord::new(key.clone(), fields.clone()))
            })
            .collect())
    }

    async fn put_multi(&self, records: Vec<PrimaryRecord>) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        state.calls.write(BACKEND_NAME)?;
        trace!(records = records.len(), "memory primary put");
        for record in records {
            state.records.insert(record.key, record.fields);
        }
        Ok(())
    }

    async fn delete_multi(&self, keys: &[EntityKey]) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        state.calls.write(BACKEND_NAME)?;
        for key in keys {
            state.records.remove(key);
        }
        Ok(())
    }

    async fn query(
        &self,
        kind: &str,
        filter: Option<&PrimaryFilter>,
    ) -> Result<Vec<PrimaryRecord>, BackendError> {
        if let Some(filter) = filter {
            let fields = filter.inequality_fields();
            if fields.len() > 1 {
                return Err(BackendError::QueryError {
                    backend_name: BACKEND_NAME.to_string(),
                    message: format!(
                        "inequality filters are limited to one property, found {:?}",
                        fields
                    ),
                });
            }
        }

        let mut state = self.state.lock();
        state.calls.query(BACKEND_NAME)?;
        Ok(state
            .records
            .iter()
            .filter(|(key, fields)| {
                key.kind() == kind && filter.is_none_or(|filter| matches(filter, fields))
            })
            .map(|(key, fields)| PrimaryRecord::new(key.clone(), fields.clone()))
            .collect())
    }
}

fn matches(filter: &PrimaryFilter, fields: &FieldMap) -> bool {
    match filter {
        PrimaryFilter::And { filters } => filters.iter().all(|f| matches(f, fields)),
        PrimaryFilter::Or { filters } => filters.iter().any(|f| matches(f, fields)),
        PrimaryFilter::Compare {
            field,
            operator,
            value,
        } => {
            // Missing fields compare as null, which matches nothing.
            let stored = fields.get(field).unwrap_or(&FieldValue::Null);
            match (operator, value) {
                (Operator::In, FieldValue::List(candidates)) => candidates
                    .iter()
                    .any(|candidate| stored.compare(candidate).is_some_and(|o| o.is_eq())),
                (operator, value) => stored
                    .compare(value)
                    .is_some_and(|ordering| operator.accepts(ordering)),
            }
        }
    }
}
