//! ---
//! pki_section: "05-request-lifecycle"
//! pki_subsection: "module"
//! pki_type: "source"
//! pki_scope: "code"
//! pki_description: "Request queue and transition state machine."
//! pki_version: "v0.0.0-prealpha"
//! pki_owner: "tbd"
//! ---
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use r_pki_common::{CaError, CaResult, ProcessingMode};
use tracing::{debug, info, warn};

use crate::metrics::LifecycleMetrics;
use crate::model::{Request, RequestId, RequestStatus, RequestType};

/// Side-effect handler for one request type. Executors receive the request
/// under the queue lock and must not call back into the queue.
pub trait RequestExecutor: Send + Sync {
    /// Commit the request's side effects (issue, revoke, restore).
    fn execute(&self, request: &mut Request) -> CaResult<()>;
}

/// Owner of all requests. Executors are injected per request type at
/// construction time; there is no global subsystem locator.
pub struct RequestQueue {
    requests: Mutex<IndexMap<RequestId, Request>>,
    executors: RwLock<HashMap<RequestType, Arc<dyn RequestExecutor>>>,
    mode: ProcessingMode,
    backlog: Mutex<VecDeque<RequestId>>,
    metrics: Option<LifecycleMetrics>,
}

impl RequestQueue {
    /// Create a queue processing in the given mode.
    pub fn new(mode: ProcessingMode) -> Self {
        Self {
            requests: Mutex::new(IndexMap::new()),
            executors: RwLock::new(HashMap::new()),
            mode,
            backlog: Mutex::new(VecDeque::new()),
            metrics: None,
        }
    }

    /// Create a queue that reports lifecycle metrics.
    pub fn with_metrics(mode: ProcessingMode, metrics: LifecycleMetrics) -> Self {
        let mut queue = Self::new(mode);
        queue.metrics = Some(metrics);
        queue
    }

    /// Processing mode the queue was built with.
    pub fn mode(&self) -> ProcessingMode {
        self.mode
    }

    /// Register the executor for a request type.
    pub fn register_executor(&self, request_type: RequestType, executor: Arc<dyn RequestExecutor>) {
        self.executors.write().insert(request_type, executor);
    }

    /// Create a request in `Begin` state and return a snapshot of it.
    pub fn create_request(
        &self,
        request_type: RequestType,
        profile_id: Option<&str>,
        ext_data: IndexMap<String, String>,
    ) -> Request {
        let request = Request::new(request_type, profile_id.map(str::to_owned), ext_data);
        debug!(request = %request.id, kind = %request_type, "request created");
        self.requests
            .lock()
            .insert(request.id, request.clone());
        request
    }

    /// Snapshot a request by id.
    pub fn get(&self, id: &RequestId) -> CaResult<Request> {
        self.requests
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| CaError::NotFound(format!("request {id}")))
    }

    /// Mutate a request under the queue lock.
    pub fn modify<T>(
        &self,
        id: &RequestId,
        apply: impl FnOnce(&mut Request) -> CaResult<T>,
    ) -> CaResult<T> {
        let mut requests = self.requests.lock();
        let request = requests
            .get_mut(id)
            .ok_or_else(|| CaError::NotFound(format!("request {id}")))?;
        apply(request)
    }

    /// Move a freshly-created request into `Pending` for agent review
    /// without executing anything.
    pub fn mark_pending(&self, id: &RequestId) -> CaResult<()> {
        self.modify(id, |request| match request.status {
            RequestStatus::Begin => {
                request.status = RequestStatus::Pending;
                request.record("pend", true, "awaiting review");
                Ok(())
            }
            other => Err(CaError::Conflict(format!(
                "request {id} is {other}, not pendable"
            ))),
        })
    }

    /// Submit a request for processing. Inline mode executes it on the
    /// calling thread; queued mode parks it until [`drain`](Self::drain).
    pub fn submit(&self, id: &RequestId) -> CaResult<RequestStatus> {
        self.modify(id, |request| {
            match request.status {
                RequestStatus::Begin | RequestStatus::Pending => {
                    request.status = RequestStatus::Pending;
                    request.record("submit", true, "accepted for processing");
                    Ok(())
                }
                other => Err(CaError::Conflict(format!(
                    "request {id} is {other}, not submittable"
                ))),
            }
        })?;

        match self.mode {
            ProcessingMode::Inline => self.execute(id),
            ProcessingMode::Queued => {
                self.backlog.lock().push_back(*id);
                debug!(request = %id, "request parked for queued processing");
                Ok(RequestStatus::Pending)
            }
        }
    }

    /// Run the registered executor for a request and commit its outcome.
    pub fn execute(&self, id: &RequestId) -> CaResult<RequestStatus> {
        let executor = {
            let request_type = self.get(id)?.request_type;
            self.executors
                .read()
                .get(&request_type)
                .cloned()
                .ok_or_else(|| {
                    CaError::Internal(format!("no executor registered for {request_type}"))
                })?
        };

        self.modify(id, |request| {
            if request.status.is_terminal() {
                return Err(CaError::Conflict(format!(
                    "request {id} already processed ({})",
                    request.status
                )));
            }
            match executor.execute(request) {
                Ok(()) => {
                    request.status = RequestStatus::Complete;
                    request.record("process", true, "side effects committed");
                    if let Some(metrics) = &self.metrics {
                        metrics.inc_completed();
                    }
                    info!(request = %request.id, "request processed");
                    Ok(RequestStatus::Complete)
                }
                Err(err) => {
                    request.record("process", false, err.to_string());
                    Err(err)
                }
            }
        })
    }

    /// Process everything parked in the backlog; returns the number of
    /// requests that completed. Failures stay on the request trail; the
    /// queue never retries on its own.
    pub fn drain(&self) -> usize {
        let ids: Vec<RequestId> = self.backlog.lock().drain(..).collect();
        let mut completed = 0usize;
        for id in ids {
            match self.execute(&id) {
                Ok(RequestStatus::Complete) => completed += 1,
                Ok(status) => debug!(request = %id, status = %status, "drain left request open"),
                Err(err) => warn!(request = %id, error = %err, "queued request failed"),
            }
        }
        completed
    }

    /// Park an already-validated request for the next drain (queued mode).
    pub fn park(&self, id: &RequestId) {
        self.backlog.lock().push_back(*id);
        debug!(request = %id, "request parked for queued processing");
    }

    /// Number of requests waiting for a drain.
    pub fn backlog_len(&self) -> usize {
        self.backlog.lock().len()
    }
}
