//! In-memory remote backend for tests: a per-entity row map with
//! failure and rejection injection.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use uuid::Uuid;

use super::mutation::EntityKind;
use super::remote::{RemoteBackend, RemoteError};

#[derive(Clone, Default)]
pub struct MockRemote {
    rows: Arc<Mutex<HashMap<(EntityKind, Uuid), Value>>>,
    fail_all: Arc<AtomicBool>,
    fail_remaining: Arc<AtomicUsize>,
    reject_all: Arc<AtomicBool>,
    ops: Arc<Mutex<Vec<String>>>,
}

impl MockRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_row(&self, entity: EntityKind, id: Uuid, payload: Value) {
        self.rows.lock().unwrap().insert((entity, id), payload);
    }

    pub fn row(&self, entity: EntityKind, id: Uuid) -> Option<Value> {
        self.rows.lock().unwrap().get(&(entity, id)).cloned()
    }

    /// Every call fails with a transport error while set.
    pub fn set_failing(&self, failing: bool) {
        self.fail_all.store(failing, Ordering::SeqCst);
    }

    /// The next `n` calls fail with a transport error.
    pub fn fail_times(&self, n: usize) {
        self.fail_remaining.store(n, Ordering::SeqCst);
    }

    /// Every call fails with a 422 rejection while set.
    pub fn set_rejecting(&self, rejecting: bool) {
        self.reject_all.store(rejecting, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> usize {
        self.ops.lock().unwrap().len()
    }

    pub fn op_log(&self) -> Vec<String> {
        self.ops.lock().unwrap().clone()
    }

    fn gate(&self, op: &str, entity: EntityKind, id: Uuid) -> Result<(), RemoteError> {
        self.ops
            .lock()
            .unwrap()
            .push(format!("{} {}/{}", op, entity, id));

        if self
            .fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(RemoteError::Transport("injected failure".to_string()));
        }
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(RemoteError::Transport("injected failure".to_string()));
        }
        if self.reject_all.load(Ordering::SeqCst) {
            return Err(RemoteError::Rejected {
                status: 422,
                message: "injected rejection".to_string(),
            });
        }
        Ok(())
    }
}

impl RemoteBackend for MockRemote {
    async fn fetch(&self, entity: EntityKind, id: Uuid) -> Result<Option<Value>, RemoteError> {
        self.gate("fetch", entity, id)?;
        Ok(self.row(entity, id))
    }

    async fn upsert(
        &self,
        entity: EntityKind,
        id: Uuid,
        payload: &Value,
    ) -> Result<(), RemoteError> {
        self.gate("upsert", entity, id)?;
        self.set_row(entity, id, payload.clone());
        Ok(())
    }

    async fn delete(&self, entity: EntityKind, id: Uuid) -> Result<(), RemoteError> {
        self.gate("delete", entity, id)?;
        self.rows.lock().unwrap().remove(&(entity, id));
        Ok(())
    }
}
