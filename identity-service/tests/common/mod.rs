#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use identity_service::repository::{NameIndexRepository, UserRepository};
use identity_service::service::{IdentityChangeCoordinator, NameIndexReconciler};
use identity_service::store::MemoryStore;
use identity_service::{KeyValueStore, Notifier, PasswordVerifier};
use serde_json::{json, Value};
use shared::{IdentityConfig, Result, ServiceError, UserId, NAME_INDEX_PATH};

pub const PASSWORD: &str = "hunter22";

#[derive(Default)]
pub struct RecordingNotifier {
    alerts: Mutex<Vec<(String, bool)>>,
}

impl RecordingNotifier {
    pub fn alerts(&self) -> Vec<(String, bool)> {
        self.alerts.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, message: &str, is_success: bool) {
        self.alerts.lock().unwrap().push((message.to_string(), is_success));
    }
}

pub struct StaticPasswordVerifier {
    password: String,
    calls: AtomicUsize,
}

impl StaticPasswordVerifier {
    pub fn new(password: &str) -> Self {
        Self {
            password: password.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PasswordVerifier for StaticPasswordVerifier {
    async fn verify(&self, candidate_password: &str) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        candidate_password == self.password
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Fault {
    Unavailable,
    Rejected,
}

impl Fault {
    fn to_error(self, path: &str) -> ServiceError {
        match self {
            Fault::Unavailable => ServiceError::StoreUnavailable(format!("injected fault at {}", path)),
            Fault::Rejected => ServiceError::StoreRejected(format!("injected fault at {}", path)),
        }
    }
}

/// Memory store that records traffic and fails chosen paths on demand.
#[derive(Default)]
pub struct FaultyStore {
    inner: MemoryStore,
    get_faults: Mutex<Vec<(String, Fault)>>,
    put_faults: Mutex<Vec<(String, Fault, usize)>>,
    hidden_paths: Mutex<HashSet<String>>,
    reads: Mutex<Vec<String>>,
    writes: Mutex<Vec<String>>,
}

impl FaultyStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            ..Default::default()
        }
    }

    pub fn fail_get(&self, path: &str, fault: Fault) {
        self.get_faults.lock().unwrap().push((path.to_string(), fault));
    }

    pub fn fail_put(&self, path: &str, fault: Fault) {
        self.fail_put_after(path, fault, 0);
    }

    /// Lets `successes` writes to `path` through, then fails every later one.
    pub fn fail_put_after(&self, path: &str, fault: Fault, successes: usize) {
        self.put_faults
            .lock()
            .unwrap()
            .push((path.to_string(), fault, successes));
    }

    pub fn clear_faults(&self) {
        self.get_faults.lock().unwrap().clear();
        self.put_faults.lock().unwrap().clear();
    }

    /// Reads of `path` return nothing, as if they ran before another
    /// client's write landed.
    pub fn hide(&self, path: &str) {
        self.hidden_paths.lock().unwrap().insert(path.to_string());
    }

    pub fn reads(&self) -> Vec<String> {
        self.reads.lock().unwrap().clone()
    }

    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().unwrap().clone()
    }

    fn get_fault(&self, path: &str) -> Option<Fault> {
        self.get_faults
            .lock()
            .unwrap()
            .iter()
            .find(|(p, _)| p == path)
            .map(|(_, fault)| *fault)
    }

    fn put_fault(&self, path: &str) -> Option<Fault> {
        let mut faults = self.put_faults.lock().unwrap();
        let (_, fault, passes) = faults.iter_mut().find(|(p, _, _)| p == path)?;
        if *passes > 0 {
            *passes -= 1;
            return None;
        }
        Some(*fault)
    }
}

#[async_trait]
impl KeyValueStore for FaultyStore {
    async fn get(&self, path: &str) -> Result<Option<Value>> {
        self.reads.lock().unwrap().push(path.to_string());
        if let Some(fault) = self.get_fault(path) {
            return Err(fault.to_error(path));
        }
        if self.hidden_paths.lock().unwrap().contains(path) {
            return Ok(None);
        }
        self.inner.get(path).await
    }

    async fn put(&self, path: &str, document: Value) -> Result<()> {
        if let Some(fault) = self.put_fault(path) {
            return Err(fault.to_error(path));
        }
        self.writes.lock().unwrap().push(path.to_string());
        self.inner.put(path, document).await
    }
}

pub struct Harness {
    pub memory: MemoryStore,
    pub store: Arc<FaultyStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub verifier: Arc<StaticPasswordVerifier>,
}

impl Harness {
    pub fn new() -> Self {
        let memory = MemoryStore::new();
        Self {
            store: Arc::new(FaultyStore::new(memory.clone())),
            memory,
            notifier: Arc::new(RecordingNotifier::default()),
            verifier: Arc::new(StaticPasswordVerifier::new(PASSWORD)),
        }
    }

    pub fn coordinator(&self) -> IdentityChangeCoordinator {
        IdentityChangeCoordinator::new(
            UserRepository::new(self.store.clone()),
            NameIndexRepository::new(self.store.clone()),
            self.verifier.clone(),
            self.notifier.clone(),
        )
    }

    pub fn coordinator_from(&self, config: &IdentityConfig) -> IdentityChangeCoordinator {
        IdentityChangeCoordinator::from_config(
            config,
            UserRepository::new(self.store.clone()),
            NameIndexRepository::new(self.store.clone()),
            self.verifier.clone(),
            self.notifier.clone(),
        )
    }

    pub fn reconciler(&self) -> NameIndexReconciler {
        NameIndexReconciler::new(
            UserRepository::new(self.store.clone()),
            NameIndexRepository::new(self.store.clone()),
        )
    }

    /// Writes a user record and its index entry directly, bypassing the
    /// traffic log.
    pub async fn seed_user(&self, id: &str, user_name: &str) -> UserId {
        self.memory
            .put(
                &format!("users/{}", id),
                json!({ "id": id, "userName": user_name, "email": format!("{}@example.com", id) }),
            )
            .await
            .unwrap();
        self.memory
            .put(&format!("{}/{}", NAME_INDEX_PATH, user_name), json!(id))
            .await
            .unwrap();
        UserId::from_string(id).unwrap()
    }

    pub async fn record(&self, id: &str) -> Option<Value> {
        self.memory.get(&format!("users/{}", id)).await.unwrap()
    }

    pub async fn index(&self) -> Value {
        self.memory
            .get(NAME_INDEX_PATH)
            .await
            .unwrap()
            .unwrap_or_else(|| json!({}))
    }
}
