//! # pmowall - video wall remote control
//!
//! Client side of a multi-screen video wall:
//!
//! - [`PollReconciler`] keeps a [`SessionState`] in sync with the backend by
//!   polling `GET /queue`, guarding optimistic fields with an
//!   [`OptimisticLock`].
//! - [`CommandDispatcher`] sends user commands (skip, remove, volume,
//!   display and animation modes, enqueue) while polling is suspended.
//! - [`geometry::project`] maps the rendered video image onto the wall
//!   layout, for TILE and REPEAT preview of every screen.
//! - [`WallSession`] wires all of it to an [`HttpBackend`] built from
//!   `pmoconfig`.

mod events;

pub mod backend;
pub mod config_ext;
pub mod dispatcher;
pub mod errors;
pub mod geometry;
pub mod layout;
pub mod lock;
pub mod model;
pub mod reconciler;
pub mod session;
pub mod state;

pub use backend::{HttpBackend, HttpBackendBuilder, WallBackend};
pub use config_ext::WallConfigExt;
pub use dispatcher::CommandDispatcher;
pub use errors::{Result, WallError};
pub use events::{SessionEvent, SessionEventBus};
pub use geometry::{
    BackgroundParams, CropBox, PixelCrop, ScaledScreen, ScaledWallLayout, WallProjector,
    displayable_video_dimensions, project,
};
pub use layout::{ScreenConfig, ScreenRect, WallLayout};
pub use lock::{LockState, LockTicket, OptimisticLock};
pub use model::{
    AnimationMode, ColorMode, DisplayMode, PlaylistEntry, PlaylistStatus, PlaylistVideoId,
    QueueResponse, QueueableVideo, QueuedVideo, TvId,
};
pub use reconciler::{PollOutcome, PollPhase, PollReconciler, PollSuspension};
pub use session::{SessionConfig, WallSession};
pub use state::{ScreenState, ScreenStates, SessionState, SharedState};
