//! In-memory tool catalog with per-entry locking for statistics updates.

use crate::tool_registry::{
    domain::{CatalogEntry, CatalogEntryId, ServerId, UsageSample, UsageStats},
    ports::{CatalogError, CatalogRepository, CatalogResult},
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

type EntrySlot = Arc<Mutex<CatalogEntry>>;

/// Thread-safe in-memory catalog repository.
///
/// The outer lock only guards the index; each entry sits behind its own
/// mutex so concurrent usage updates on different tools never contend.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    state: Arc<RwLock<InMemoryCatalogState>>,
}

#[derive(Debug, Default)]
struct InMemoryCatalogState {
    entries: HashMap<CatalogEntryId, EntrySlot>,
    tool_index: HashMap<(ServerId, String), CatalogEntryId>,
}

impl InMemoryCatalog {
    /// Creates an empty in-memory catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, entry_id: CatalogEntryId) -> CatalogResult<Option<EntrySlot>> {
        let state = self.state.read().map_err(lock_error)?;
        Ok(state.entries.get(&entry_id).cloned())
    }
}

fn lock_error(err: impl ToString) -> CatalogError {
    CatalogError::persistence(std::io::Error::other(err.to_string()))
}

fn snapshot(slot: &EntrySlot) -> CatalogResult<CatalogEntry> {
    Ok(slot.lock().map_err(lock_error)?.clone())
}

#[async_trait]
impl CatalogRepository for InMemoryCatalog {
    async fn upsert(&self, entry: &CatalogEntry) -> CatalogResult<()> {
        let mut state = self.state.write().map_err(lock_error)?;
        let key = (entry.server_id(), entry.tool_name().to_owned());

        if let Some(&indexed_id) = state.tool_index.get(&key)
            && indexed_id != entry.id()
        {
            return Err(CatalogError::DuplicateTool {
                server_id: entry.server_id(),
                tool_name: entry.tool_name().to_owned(),
            });
        }

        if let Some(slot) = state.entries.get(&entry.id()) {
            let mut stored = slot.lock().map_err(lock_error)?;
            let stats = stored.stats();
            *stored = entry.clone().with_stats(stats);
            return Ok(());
        }

        state.tool_index.insert(key, entry.id());
        state
            .entries
            .insert(entry.id(), Arc::new(Mutex::new(entry.clone())));
        Ok(())
    }

    async fn find_by_id(&self, entry_id: CatalogEntryId) -> CatalogResult<Option<CatalogEntry>> {
        self.slot(entry_id)?.as_ref().map(snapshot).transpose()
    }

    async fn find_by_tool(
        &self,
        server_id: ServerId,
        tool_name: &str,
    ) -> CatalogResult<Option<CatalogEntry>> {
        let state = self.state.read().map_err(lock_error)?;
        state
            .tool_index
            .get(&(server_id, tool_name.to_owned()))
            .and_then(|id| state.entries.get(id))
            .map(snapshot)
            .transpose()
    }

    async fn list_for_server(&self, server_id: ServerId) -> CatalogResult<Vec<CatalogEntry>> {
        let state = self.state.read().map_err(lock_error)?;
        let mut entries = Vec::new();
        for slot in state.entries.values() {
            let entry = snapshot(slot)?;
            if entry.server_id() == server_id {
                entries.push(entry);
            }
        }
        entries.sort_by(|left, right| left.tool_name().cmp(right.tool_name()));
        Ok(entries)
    }

    async fn remove_for_server(&self, server_id: ServerId) -> CatalogResult<usize> {
        let mut state = self.state.write().map_err(lock_error)?;
        let doomed: Vec<(ServerId, String)> = state
            .tool_index
            .keys()
            .filter(|(owner, _)| *owner == server_id)
            .cloned()
            .collect();
        for key in &doomed {
            if let Some(entry_id) = state.tool_index.remove(key) {
                state.entries.remove(&entry_id);
            }
        }
        Ok(doomed.len())
    }

    async fn record_usage(
        &self,
        entry_id: CatalogEntryId,
        sample: UsageSample,
    ) -> CatalogResult<UsageStats> {
        let slot = self.slot(entry_id)?.ok_or(CatalogError::NotFound(entry_id))?;
        let mut entry = slot.lock().map_err(lock_error)?;
        entry.record_usage(sample);
        Ok(entry.stats())
    }
}
