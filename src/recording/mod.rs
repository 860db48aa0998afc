//! Supervision of a single call-recording job.

pub mod error;
pub mod finalize;
pub mod metadata;
pub mod monitor;
pub mod restart;
pub mod service;
pub mod sink;
pub mod status;

#[cfg(test)]
mod testing;

pub use error::{FinalizeError, RecordingError};
pub use finalize::{Finalizer, NoopFinalizer, ScriptFinalizer};
pub use metadata::RecordingMetadata;
pub use monitor::{
    MonitorControl, MonitorHandle, MonitorSchedule, ProcessMonitor, Unhealthy, UnhealthyHandler,
};
pub use restart::RestartPolicy;
pub use service::{RecordingParams, RecordingService};
pub use sink::{Sink, SinkHandle, SinkNamer};
pub use status::{
    ServicePhase, ServiceState, ServiceStateHandle, ServiceStatus, StatusHandler, StatusPublisher,
};
