//! Local and remote deployment bookkeeping
//!
//! Two maps keyed by deployment name:
//! - `local`: deployments started by this process
//! - `remote`: deployments reported by the last refresh
//!
//! Every access goes through this module. When both maps are needed the
//! locks are taken in the order `local` then `remote`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::deploy::fsm::{DeploymentRecord, DeploymentStatus};
use crate::runtime::DeploymentRuntime;

type RecordMap = HashMap<String, Arc<DeploymentRecord>>;

/// Map a record was found in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentOrigin {
    Local,
    Remote,
}

/// Deployments known for one connection
#[derive(Default)]
pub struct DeploymentRegistry {
    local: Mutex<RecordMap>,
    remote: Mutex<RecordMap>,
}

impl DeploymentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a deployment started by this process
    pub fn insert_local(&self, record: Arc<DeploymentRecord>) -> Option<Arc<DeploymentRecord>> {
        let mut local = self.lock_local();
        local.insert(record.name().to_string(), record)
    }

    /// Find a record by name, local first
    pub fn find(&self, name: &str) -> Option<(Arc<DeploymentRecord>, DeploymentOrigin)> {
        let local = self.lock_local();
        let remote = self.lock_remote();
        Self::find_in(&local, &remote, name)
    }

    pub fn get_local(&self, name: &str) -> Option<Arc<DeploymentRecord>> {
        self.lock_local().get(name).cloned()
    }

    pub fn get_remote(&self, name: &str) -> Option<Arc<DeploymentRecord>> {
        self.lock_remote().get(name).cloned()
    }

    /// Find a record and move it from Deployed to Undeploying.
    ///
    /// The record is returned even when the transition does not apply, so
    /// the caller can still settle it once the server answers.
    pub fn begin_undeploy(&self, name: &str) -> Option<(Arc<DeploymentRecord>, DeploymentOrigin)> {
        let local = self.lock_local();
        let remote = self.lock_remote();
        let found = Self::find_in(&local, &remote, name);
        if let Some((record, _)) = &found {
            record.change_state(
                DeploymentStatus::Deployed,
                DeploymentStatus::Undeploying,
                None,
                None,
            );
        }
        found
    }

    /// Guarded transition under the lock of the map the record belongs to
    pub fn transition(
        &self,
        origin: DeploymentOrigin,
        record: &DeploymentRecord,
        expected: DeploymentStatus,
        new: DeploymentStatus,
        error_message: Option<String>,
        runtime: Option<Arc<dyn DeploymentRuntime>>,
    ) -> bool {
        let _guard = self.lock_origin(origin);
        record.change_state(expected, new, error_message, runtime)
    }

    /// Move an undeploying record to NotDeployed and drop it from its map.
    ///
    /// Nothing is removed unless the transition applies, and only the very
    /// same record is removed; a newer record under the same name stays.
    pub fn finish_undeploy(&self, origin: DeploymentOrigin, record: &Arc<DeploymentRecord>) -> bool {
        let mut map = self.lock_origin(origin);
        let applied = record.change_state(
            DeploymentStatus::Undeploying,
            DeploymentStatus::NotDeployed,
            None,
            None,
        );
        if applied {
            let same = map
                .get(record.name())
                .is_some_and(|current| Arc::ptr_eq(current, record));
            if same {
                map.remove(record.name());
            }
        }
        applied
    }

    /// Replace everything the server reported with a new enumeration
    pub fn replace_remote(&self, records: impl IntoIterator<Item = Arc<DeploymentRecord>>) {
        let fresh: RecordMap = records
            .into_iter()
            .map(|record| (record.name().to_string(), record))
            .collect();
        *self.lock_remote() = fresh;
    }

    pub fn clear_remote(&self) {
        self.lock_remote().clear();
    }

    /// Merged view, sorted by name. Local records shadow remote ones.
    ///
    /// Each map is copied under its own lock; the merge happens unlocked.
    pub fn deployments(&self) -> Vec<Arc<DeploymentRecord>> {
        let mut merged = self.lock_remote().clone();
        let local = self.lock_local().clone();
        merged.extend(local);

        let mut result: Vec<Arc<DeploymentRecord>> = merged.into_values().collect();
        result.sort_by(|a, b| a.name().cmp(b.name()));
        result
    }

    pub fn local_len(&self) -> usize {
        self.lock_local().len()
    }

    pub fn remote_len(&self) -> usize {
        self.lock_remote().len()
    }

    fn find_in(
        local: &RecordMap,
        remote: &RecordMap,
        name: &str,
    ) -> Option<(Arc<DeploymentRecord>, DeploymentOrigin)> {
        if let Some(record) = local.get(name) {
            return Some((record.clone(), DeploymentOrigin::Local));
        }
        remote
            .get(name)
            .map(|record| (record.clone(), DeploymentOrigin::Remote))
    }

    fn lock_origin(&self, origin: DeploymentOrigin) -> MutexGuard<'_, RecordMap> {
        match origin {
            DeploymentOrigin::Local => self.lock_local(),
            DeploymentOrigin::Remote => self.lock_remote(),
        }
    }

    fn lock_local(&self) -> MutexGuard<'_, RecordMap> {
        self.local.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_remote(&self) -> MutexGuard<'_, RecordMap> {
        self.remote.lock().unwrap_or_else(|e| e.into_inner())
    }
}
