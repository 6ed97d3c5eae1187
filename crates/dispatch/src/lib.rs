//! Animal welfare dispatch orchestration.
//!
//! Turns a rule engine verdict into a dispatch record with a response
//! deadline, alerts every eligible responder, optionally notifies police,
//! and keeps an audit trail of the dispatch's acknowledge/resolve/expire
//! transitions.

pub mod error;
pub mod expiry;
pub mod model;
pub mod orchestrator;
pub mod police;
pub mod repository;

pub use error::DispatchError;
pub use expiry::{ExpiredDispatch, ExpirySweeper};
pub use model::{
    AuditAction, AuditEntry, AuditMetadata, ContactInfo, DispatchParams, DispatchRequest,
    DispatchStatus, Location, ResolutionCode, Responder, StatusChange,
};
pub use orchestrator::{DispatchOrchestrator, DispatchOutcome, OrchestratorConfig};
pub use police::{PoliceLog, PoliceNotificationRecord, TracingPoliceLog};
pub use repository::{DispatchRepository, InMemoryDispatchRepository};
