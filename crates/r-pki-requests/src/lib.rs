//! ---
//! pki_section: "05-request-lifecycle"
//! pki_subsection: "module"
//! pki_type: "source"
//! pki_scope: "code"
//! pki_description: "Request queue and transition state machine."
//! pki_version: "v0.0.0-prealpha"
//! pki_owner: "tbd"
//! ---

pub mod executors;
pub mod machine;
pub mod metrics;
pub mod model;
pub mod queue;

pub use executors::EnrollmentExecutor;
pub use machine::{RequestOperation, RequestStateMachine, TransitionOutcome};
pub use metrics::LifecycleMetrics;
pub use model::{ProcessingEvent, Request, RequestId, RequestStatus, RequestType};
pub use queue::{RequestExecutor, RequestQueue};
