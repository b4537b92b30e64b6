//! In-memory trade store.

use std::collections::BTreeMap;

use patternlab_core::domain::{Ticket, TradeRecord};
use patternlab_core::engine::{StoreError, TradeStore};

/// Trade records keyed by ticket; iteration is in ticket order.
#[derive(Debug, Clone, Default)]
pub struct MemoryTradeStore {
    records: BTreeMap<Ticket, TradeRecord>,
}

impl MemoryTradeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl TradeStore for MemoryTradeStore {
    fn save(&mut self, record: &TradeRecord) -> Result<(), StoreError> {
        self.records.insert(record.ticket, record.clone());
        Ok(())
    }

    fn load(&self, ticket: Ticket) -> Result<Option<TradeRecord>, StoreError> {
        Ok(self.records.get(&ticket).cloned())
    }

    fn all(&self) -> Result<Vec<TradeRecord>, StoreError> {
        Ok(self.records.values().cloned().collect())
    }
}
