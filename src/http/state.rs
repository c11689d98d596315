use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::Config;
use crate::error::Result;
use crate::events::EventBus;
use crate::reconcile::ReconcileReport;
use crate::serial::LineLink;
use crate::session::{
    AcquisitionSession, Clock, DeferredPrompt, SessionConfig, SessionHandle, SessionRunner,
};

/// The session task and the handle into it.
pub struct ActiveSession {
    pub handle: SessionHandle,
    /// Taken by the stop handler while it waits for the outcome
    pub task: Option<JoinHandle<Result<Option<ReconcileReport>>>>,
}

/// Marks a setup in progress until dropped.
pub struct SetupGuard {
    setting_up: Arc<AtomicBool>,
}

impl Drop for SetupGuard {
    fn drop(&mut self) {
        self.setting_up.store(false, Ordering::SeqCst);
    }
}

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub bus: EventBus,
    /// At most one session per device
    pub session: Arc<Mutex<Option<ActiveSession>>>,
    setting_up: Arc<AtomicBool>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            bus: EventBus::default(),
            session: Arc::new(Mutex::new(None)),
            setting_up: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_setting_up(&self) -> bool {
        self.setting_up.load(Ordering::SeqCst)
    }

    /// Reserves the session slot for a setup. `None` while a session exists
    /// or another setup is running.
    pub async fn begin_setup(&self) -> Option<SetupGuard> {
        let slot = self.session.lock().await;
        if slot.is_some() || self.setting_up.swap(true, Ordering::SeqCst) {
            return None;
        }
        Some(SetupGuard {
            setting_up: self.setting_up.clone(),
        })
    }

    /// Runs the handshake on `link` and installs the session task.
    ///
    /// The session lock is not held meanwhile, so other requests see the
    /// setup in progress instead of waiting on it.
    pub async fn set_up_session<T>(
        &self,
        guard: SetupGuard,
        config: SessionConfig,
        link: LineLink<T>,
        clock: Arc<dyn Clock>,
    ) -> Result<SessionHandle>
    where
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let session = AcquisitionSession::new(config, self.bus.clone());
        let prompt = DeferredPrompt {
            review: self.config.recording.review_processed,
        };
        let (runner, handle) = SessionRunner::connect(session, link, prompt, clock).await?;

        *self.session.lock().await = Some(ActiveSession {
            handle: handle.clone(),
            task: Some(tokio::spawn(runner.run())),
        });
        drop(guard);
        info!("Session ready");
        Ok(handle)
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(Config::default())
    }
}
