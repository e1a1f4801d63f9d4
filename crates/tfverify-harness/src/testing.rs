//! In-memory collaborators for exercising the harness without terraform or Azure.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tfverify_domain::{OutputSet, ResourceIdentity};
use tfverify_driver::{DriverError, ProviderVerifier, ProvisionOptions, Provisioner};

/// Shared, ordered log of lifecycle events.
pub type EventLog = Arc<Mutex<Vec<String>>>;

pub fn event_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn events(log: &EventLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

/// Raised while some work is in flight, lowered when that work's future is
/// dropped (finished or cancelled).
#[derive(Clone, Default)]
pub struct BusyFlag(Arc<AtomicBool>);

impl BusyFlag {
    pub fn enter(&self) -> BusyGuard {
        self.0.store(true, Ordering::SeqCst);
        BusyGuard(self.0.clone())
    }

    pub fn is_busy(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct FakeProvisioner {
    pub fail_apply: bool,
    pub fail_outputs: bool,
    pub fail_destroy: bool,
    pub outputs: OutputSet,
    pub applies: AtomicUsize,
    pub destroys: AtomicUsize,
    pub log: Option<EventLog>,
    /// Apply never returns.
    pub stall_apply: bool,
    /// Raised by a stalled apply; tests may share it with other work.
    pub busy: BusyFlag,
    /// Set when destroy starts while `busy` is raised.
    pub destroyed_while_busy: AtomicBool,
}

impl FakeProvisioner {
    pub fn with_outputs(outputs: OutputSet) -> Self {
        Self { outputs, ..Self::default() }
    }

    fn note(&self, event: &str) {
        if let Some(log) = &self.log {
            log.lock().unwrap().push(event.to_string());
        }
    }

    pub fn destroy_count(&self) -> usize {
        self.destroys.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provisioner for FakeProvisioner {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn init_and_apply(&self, opts: &ProvisionOptions) -> Result<(), DriverError> {
        assert!(opts.working_dir.is_dir(), "working copy must exist during apply");
        self.applies.fetch_add(1, Ordering::SeqCst);
        self.note("apply");
        if self.stall_apply {
            let _busy = self.busy.enter();
            std::future::pending::<()>().await;
        }
        if self.fail_apply {
            return Err(DriverError::ProvisionFailed("simulated apply failure".into()));
        }
        Ok(())
    }

    async fn destroy(&self, opts: &ProvisionOptions) -> Result<(), DriverError> {
        assert!(opts.working_dir.is_dir(), "working copy must exist during destroy");
        if self.busy.is_busy() {
            self.destroyed_while_busy.store(true, Ordering::SeqCst);
        }
        self.destroys.fetch_add(1, Ordering::SeqCst);
        self.note("destroy");
        if self.fail_destroy {
            return Err(DriverError::TeardownFailed("simulated destroy failure".into()));
        }
        Ok(())
    }

    async fn outputs(&self, _opts: &ProvisionOptions) -> Result<OutputSet, DriverError> {
        self.note("outputs");
        if self.fail_outputs {
            return Err(DriverError::ProvisionFailed("simulated output failure".into()));
        }
        Ok(self.outputs.clone())
    }
}

/// Resources listed in `existing` are present; everything else is absent.
#[derive(Default)]
pub struct FakeVerifier {
    pub existing: HashSet<ResourceIdentity>,
    pub queries: Mutex<Vec<ResourceIdentity>>,
    pub fail: bool,
}

impl FakeVerifier {
    pub fn with(existing: impl IntoIterator<Item = ResourceIdentity>) -> Self {
        Self {
            existing: existing.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn query_count(&self) -> usize {
        self.queries.lock().unwrap().len()
    }
}

#[async_trait]
impl ProviderVerifier for FakeVerifier {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn lookup(&self, id: &ResourceIdentity) -> Result<Option<Value>, DriverError> {
        self.queries.lock().unwrap().push(id.clone());
        if self.fail {
            return Err(DriverError::Provider("simulated outage".into()));
        }
        Ok(self
            .existing
            .contains(id)
            .then(|| json!({ "name": id.name, "properties": { "frontdoorId": "fd-guid" } })))
    }
}

/// Parse a `terraform output -json`-shaped document.
pub fn outputs(doc: Value) -> OutputSet {
    let wrapped: serde_json::Map<String, Value> = doc
        .as_object()
        .expect("object")
        .iter()
        .map(|(k, v)| (k.clone(), json!({ "sensitive": false, "value": v })))
        .collect();
    OutputSet::from_terraform_json(&Value::Object(wrapped)).expect("valid outputs")
}
