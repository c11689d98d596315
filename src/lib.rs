pub mod annotation;
pub mod config;
pub mod error;
pub mod eventlog;
pub mod events;
pub mod http;
pub mod reconcile;
pub mod sample;
pub mod serial;
pub mod session;

pub use annotation::{Annotation, AnnotationKind};
pub use config::Config;
pub use error::{AcquisitionError, Result};
pub use eventlog::{read_log, EventLogWriter, LogEvent};
pub use events::{EventBus, SessionEvent};
pub use http::{create_router, AppState};
pub use reconcile::{reconcile_file, ReconcileReport, TrailingSample};
pub use sample::{Sample, LIVE_CHANNEL};
pub use serial::{AcquisitionParams, LineLink, PortInfo};
pub use session::{
    AcquisitionSession, FixedPrompt, PauseDecision, SessionConfig, SessionHandle, SessionRunner,
    SessionState, SessionStats,
};
