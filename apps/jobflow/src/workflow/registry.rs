use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use super::WorkflowError;
use crate::models::analysis::AnalysisReport;
use crate::models::job::JobDescription;
use crate::poller::ProgressObserver;
use crate::reconcile::ReconcileSummary;
use crate::service_client::ServiceKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    Processing,
    Completed,
    Failed,
    Cancelled,
}

/// Everything the panel shows about one workflow run.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowSnapshot {
    pub id: Uuid,
    pub service: ServiceKind,
    pub state: WorkflowState,
    pub trace_id: Option<String>,
    pub progress: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub job_descriptions: Vec<JobDescription>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconcile: Option<ReconcileSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<AnalysisReport>,
    pub error: Option<String>,
    /// Non-fatal problem next to a successful result, e.g. a failed table update.
    pub warning: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowSnapshot {
    fn new(service: ServiceKind) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            service,
            state: WorkflowState::Processing,
            trace_id: None,
            progress: BTreeMap::new(),
            job_descriptions: Vec::new(),
            reconcile: None,
            analysis: None,
            error: None,
            warning: None,
            created_at: now,
            updated_at: now,
        }
    }
}

struct Entry {
    snapshot: WorkflowSnapshot,
    cancel: CancellationToken,
}

/// Finished runs kept for lookup before the oldest are dropped.
const DEFAULT_RETENTION: usize = 100;

#[derive(Default)]
struct Inner {
    workflows: HashMap<Uuid, Entry>,
    active: HashMap<ServiceKind, Uuid>,
    /// Finished run ids, oldest first.
    finished: VecDeque<Uuid>,
}

/// In-process record of workflow runs. At most one run per service is active,
/// and only the most recent `retention` finished runs are kept.
#[derive(Clone)]
pub struct WorkflowRegistry {
    inner: Arc<Mutex<Inner>>,
    retention: usize,
}

impl Default for WorkflowRegistry {
    fn default() -> Self {
        Self {
            inner: Arc::default(),
            retention: DEFAULT_RETENTION,
        }
    }
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retention(mut self, retention: usize) -> Self {
        self.retention = retention;
        self
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Registers a new processing run, refusing if one is already active for `service`.
    pub fn begin(
        &self,
        service: ServiceKind,
    ) -> Result<(WorkflowSnapshot, CancellationToken), WorkflowError> {
        let mut inner = self.lock();
        if inner.active.contains_key(&service) {
            return Err(WorkflowError::AlreadyRunning(service.label()));
        }
        let snapshot = WorkflowSnapshot::new(service);
        let cancel = CancellationToken::new();
        inner.active.insert(service, snapshot.id);
        inner.workflows.insert(
            snapshot.id,
            Entry {
                snapshot: snapshot.clone(),
                cancel: cancel.clone(),
            },
        );
        Ok((snapshot, cancel))
    }

    pub fn get(&self, id: Uuid) -> Option<WorkflowSnapshot> {
        self.lock().workflows.get(&id).map(|e| e.snapshot.clone())
    }

    pub fn update(&self, id: Uuid, apply: impl FnOnce(&mut WorkflowSnapshot)) {
        if let Some(entry) = self.lock().workflows.get_mut(&id) {
            apply(&mut entry.snapshot);
            entry.snapshot.updated_at = Utc::now();
        }
    }

    /// Records the terminal state, frees the service slot and evicts the
    /// oldest finished runs beyond the retention limit.
    pub fn finish(&self, id: Uuid, apply: impl FnOnce(&mut WorkflowSnapshot)) {
        let mut inner = self.lock();
        let Some(entry) = inner.workflows.get_mut(&id) else {
            return;
        };
        apply(&mut entry.snapshot);
        entry.snapshot.updated_at = Utc::now();
        let service = entry.snapshot.service;
        if inner.active.get(&service) == Some(&id) {
            inner.active.remove(&service);
        }

        if !inner.finished.contains(&id) {
            inner.finished.push_back(id);
        }
        while inner.finished.len() > self.retention {
            if let Some(oldest) = inner.finished.pop_front() {
                inner.workflows.remove(&oldest);
                debug!("Evicted finished workflow {oldest}");
            }
        }
    }

    /// Signals an active run to stop before its next scheduled status check.
    pub fn cancel(&self, id: Uuid) -> Result<WorkflowSnapshot, WorkflowError> {
        let inner = self.lock();
        let entry = inner
            .workflows
            .get(&id)
            .ok_or(WorkflowError::NotFound(id))?;
        if entry.snapshot.state != WorkflowState::Processing {
            return Err(WorkflowError::NotActive(id));
        }
        entry.cancel.cancel();
        Ok(entry.snapshot.clone())
    }

    pub fn observer(&self, id: Uuid) -> RegistryObserver {
        RegistryObserver {
            registry: self.clone(),
            id,
        }
    }
}

/// Publishes poll progress into a registry entry.
pub struct RegistryObserver {
    registry: WorkflowRegistry,
    id: Uuid,
}

impl ProgressObserver for RegistryObserver {
    fn on_submitted(&self, trace_id: &str) {
        self.registry
            .update(self.id, |s| s.trace_id = Some(trace_id.to_string()));
    }

    fn on_progress(&self, trace_id: &str, progress: &BTreeMap<String, String>) {
        self.registry.update(self.id, |s| {
            s.trace_id = Some(trace_id.to_string());
            s.progress = progress.clone();
        });
    }
}
