//! Session facade tying the state, the poll loop and the commands together.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel::Receiver;
use pmoconfig::Config;
use tracing::info;

use crate::backend::{DEFAULT_API_BASE, DEFAULT_REQUEST_TIMEOUT_SECS, HttpBackend, WallBackend};
use crate::config_ext::WallConfigExt;
use crate::dispatcher::CommandDispatcher;
use crate::errors::Result;
use crate::events::{SessionEvent, SessionEventBus};
use crate::geometry::WallProjector;
use crate::layout::WallLayout;
use crate::model::ColorMode;
use crate::reconciler::PollReconciler;
use crate::state::{SessionState, SharedState, lock_state};

/// Client settings, usually read with [`WallConfigExt::get_session_config`].
#[derive(Clone, Debug, PartialEq)]
pub struct SessionConfig {
    pub api_base_url: String,
    pub poll_interval: Duration,
    /// Added to the poll interval to get the volume lock fallback release.
    pub volume_lock_margin: Duration,
    pub request_timeout: Duration,
    pub default_color_mode: ColorMode,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE.to_string(),
            poll_interval: Duration::from_millis(1000),
            volume_lock_margin: Duration::from_millis(500),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            default_color_mode: ColorMode::default(),
        }
    }
}

/// One remote-control session against a wall backend.
///
/// ```no_run
/// use pmoconfig::get_config;
/// use pmowall::WallSession;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let session = WallSession::connect(&get_config())?;
///     let events = session.subscribe();
///     session.start();
///
///     session.commands().skip().await?;
///     while let Ok(event) = events.recv() {
///         println!("{:?}", event);
///     }
///     Ok(())
/// }
/// ```
pub struct WallSession {
    state: SharedState,
    events: SessionEventBus,
    layout: Arc<WallLayout>,
    reconciler: Arc<PollReconciler>,
    commands: CommandDispatcher,
}

impl WallSession {
    pub fn new(backend: Arc<dyn WallBackend>, layout: WallLayout, config: SessionConfig) -> Self {
        let layout = Arc::new(layout);
        let state: SharedState = Arc::new(Mutex::new(
            SessionState::new(Some(config.poll_interval + config.volume_lock_margin))
                .with_screens(layout.tv_ids()),
        ));
        let events = SessionEventBus::new();
        let reconciler = Arc::new(PollReconciler::new(
            Arc::clone(&backend),
            Arc::clone(&state),
            events.clone(),
            config.poll_interval,
        ));
        let commands = CommandDispatcher::new(
            backend,
            Arc::clone(&state),
            events.clone(),
            Arc::clone(&reconciler),
            Arc::clone(&layout),
            config.default_color_mode,
        );

        Self {
            state,
            events,
            layout,
            reconciler,
            commands,
        }
    }

    /// Builds an HTTP session from the configuration.
    pub fn connect(config: &Config) -> Result<Self> {
        let layout = config.get_wall_layout()?;
        let session_config = config.get_session_config();
        let backend = HttpBackend::builder()
            .api_base(session_config.api_base_url.clone())
            .timeout(session_config.request_timeout)
            .build()?;
        info!(
            api_base = backend.api_base(),
            screens = layout.screens().len(),
            "Wall session configured"
        );
        Ok(Self::new(Arc::new(backend), layout, session_config))
    }

    /// Starts polling. Must be called from within a tokio runtime.
    pub fn start(&self) {
        self.reconciler.start();
    }

    pub fn shutdown(&self) {
        self.reconciler.shutdown();
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> SessionState {
        lock_state(&self.state).clone()
    }

    pub fn subscribe(&self) -> Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn commands(&self) -> &CommandDispatcher {
        &self.commands
    }

    pub fn reconciler(&self) -> &Arc<PollReconciler> {
        &self.reconciler
    }

    pub fn layout(&self) -> &WallLayout {
        &self.layout
    }

    /// A projector for this session's wall, to feed with image resizes.
    pub fn projector(&self) -> WallProjector {
        WallProjector::new(WallLayout::clone(&self.layout))
    }
}

impl Drop for WallSession {
    fn drop(&mut self) {
        // The pending timer holds the reconciler alive
        self.reconciler.shutdown();
    }
}
