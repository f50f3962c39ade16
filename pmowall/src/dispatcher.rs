//! User commands sent to the wall backend.
//!
//! Every command suspends the poll loop for its whole duration, applies its
//! optimistic local change, awaits the backend and resumes polling whatever
//! the outcome. Nothing is retried: the next poll is what reconverges the
//! state with the backend.
//!
//! Completion work (lock release, loading flags, resuming the poll loop) lives
//! in drop guards so that it also runs when the caller drops the command
//! future, e.g. under `tokio::time::timeout`.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::backend::WallBackend;
use crate::errors::{Result, WallError};
use crate::events::{SessionEvent, SessionEventBus};
use crate::layout::WallLayout;
use crate::model::{
    AnimationMode, ColorMode, CommandResponse, DisplayMode, EnqueueRequest, PlaylistVideoId,
    QueueableVideo, QueuedVideo, TvId,
};
use crate::reconciler::PollReconciler;
use crate::state::{SharedState, lock_state};

#[derive(Clone, Copy, Debug)]
enum LockedField {
    Volume,
    Animation,
}

// Marks the lock releasable when the command completes or is dropped.
struct LockRelease<'a> {
    state: &'a SharedState,
    field: LockedField,
}

impl<'a> LockRelease<'a> {
    fn new(state: &'a SharedState, field: LockedField) -> Self {
        Self { state, field }
    }
}

impl Drop for LockRelease<'_> {
    fn drop(&mut self) {
        let mut state = lock_state(self.state);
        let lock = match self.field {
            LockedField::Volume => &mut state.volume_lock,
            LockedField::Animation => &mut state.animation_lock,
        };
        lock.mark_releasable(Instant::now());
    }
}

// Screens flagged `loading` while a display-mode request is pending.
struct LoadingScreens<'a> {
    state: &'a SharedState,
    events: &'a SessionEventBus,
    tv_ids: Vec<TvId>,
}

impl<'a> LoadingScreens<'a> {
    fn start(state: &'a SharedState, events: &'a SessionEventBus, tv_ids: Vec<TvId>) -> Self {
        {
            let mut state = lock_state(state);
            state.screens = state.screens.with_loading(&tv_ids, true);
        }
        events.broadcast(SessionEvent::ScreensChanged);
        Self {
            state,
            events,
            tv_ids,
        }
    }
}

impl Drop for LoadingScreens<'_> {
    fn drop(&mut self) {
        {
            let mut state = lock_state(self.state);
            state.screens = state.screens.with_loading(&self.tv_ids, false);
        }
        self.events.broadcast(SessionEvent::ScreensChanged);
    }
}

pub struct CommandDispatcher {
    backend: Arc<dyn WallBackend>,
    state: SharedState,
    events: SessionEventBus,
    reconciler: Arc<PollReconciler>,
    layout: Arc<WallLayout>,
    default_color_mode: ColorMode,
}

impl CommandDispatcher {
    pub fn new(
        backend: Arc<dyn WallBackend>,
        state: SharedState,
        events: SessionEventBus,
        reconciler: Arc<PollReconciler>,
        layout: Arc<WallLayout>,
        default_color_mode: ColorMode,
    ) -> Self {
        Self {
            backend,
            state,
            events,
            reconciler,
            layout,
            default_color_mode,
        }
    }

    async fn call(
        &self,
        command: &'static str,
        request: impl Future<Output = Result<CommandResponse>>,
    ) -> Result<()> {
        let result = request
            .await
            .and_then(|response| response.into_result(command));
        match &result {
            Ok(()) => debug!(command, "Wall command accepted"),
            Err(err) => warn!(command, error = %err, "Wall command failed"),
        }
        result
    }

    /// Skips the entry currently shown as playing.
    ///
    /// The id is captured before anything is awaited, so the request names
    /// the entry the user saw even if a poll replaces it meanwhile. Returns
    /// `false` when nothing is playing.
    pub async fn skip(&self) -> Result<bool> {
        let current = lock_state(&self.state)
            .playlist_current_video
            .as_ref()
            .map(|entry| entry.playlist_video_id);
        match current {
            Some(playlist_video_id) => self.skip_video(playlist_video_id).await.map(|()| true),
            None => Ok(false),
        }
    }

    /// Skips `playlist_video_id` if it is still the one playing.
    ///
    /// Polling resumes one interval later: the backend reports the next
    /// entry only after a short delay.
    pub async fn skip_video(&self, playlist_video_id: PlaylistVideoId) -> Result<()> {
        let _suspension = self.reconciler.suspend(self.reconciler.interval());
        self.call("skip", self.backend.skip(playlist_video_id)).await
    }

    pub async fn remove(&self, playlist_video_id: PlaylistVideoId) -> Result<()> {
        let _suspension = self.reconciler.suspend(Duration::ZERO);
        self.call("remove", self.backend.remove(playlist_video_id))
            .await
    }

    pub async fn clear(&self) -> Result<()> {
        let _suspension = self.reconciler.suspend(Duration::ZERO);
        self.call("clear", self.backend.clear()).await
    }

    /// Queues a video; `None` uses the configured color mode.
    pub async fn enqueue(&self, video: QueueableVideo, color_mode: Option<ColorMode>) -> Result<()> {
        let color_mode = color_mode.unwrap_or_else(|| self.default_color_mode.clone());
        let _suspension = self.reconciler.suspend(Duration::ZERO);

        let request = EnqueueRequest::new(&video, &color_mode);
        self.call("queue", self.backend.enqueue(&request)).await?;

        let title = video.title.clone();
        lock_state(&self.state).last_queued.push(QueuedVideo {
            video,
            color_mode: color_mode.clone(),
        });
        self.events
            .broadcast(SessionEvent::VideoQueued { title, color_mode });
        Ok(())
    }

    /// Start of a volume drag: polls stop overwriting the volume.
    pub fn begin_volume_change(&self) {
        lock_state(&self.state).volume_lock.acquire();
    }

    /// End of a volume drag: the next poll is authoritative again.
    pub fn end_volume_change(&self) {
        lock_state(&self.state)
            .volume_lock
            .mark_releasable(Instant::now());
    }

    /// Sets the volume optimistically then sends it.
    ///
    /// Outside a drag the command guards the volume itself for its duration.
    pub async fn set_vol_pct(&self, vol_pct: u8) -> Result<()> {
        let vol_pct = vol_pct.min(100);
        let _suspension = self.reconciler.suspend(Duration::ZERO);

        let (owns_lock, changed) = {
            let mut state = lock_state(&self.state);
            let dragging = state.volume_lock.is_locked();
            if !dragging {
                state.volume_lock.acquire();
            }
            let changed = state.vol_pct != Some(vol_pct);
            state.vol_pct = Some(vol_pct);
            (!dragging, changed)
        };
        if changed {
            self.events.broadcast(SessionEvent::VolumeChanged { vol_pct });
        }

        let _release = owns_lock.then(|| LockRelease::new(&self.state, LockedField::Volume));
        self.call("vol_pct", self.backend.set_vol_pct(vol_pct)).await
    }

    /// Sets the display mode of some screens.
    ///
    /// The screens show `loading` while the request is pending; the flag is
    /// cleared on completion whether or not the backend accepted the change.
    pub async fn set_display_mode(&self, modes: BTreeMap<TvId, DisplayMode>) -> Result<()> {
        if modes.is_empty() {
            return Ok(());
        }
        {
            let state = lock_state(&self.state);
            if let Some(unknown) = modes
                .keys()
                .find(|tv_id| self.layout.screen(tv_id).is_none() && !state.screens.contains(tv_id))
            {
                return Err(WallError::UnknownScreen(unknown.clone()));
            }
        }

        let _suspension = self.reconciler.suspend(Duration::ZERO);
        let _loading =
            LoadingScreens::start(&self.state, &self.events, modes.keys().cloned().collect());

        self.call("display_mode", self.backend.set_display_mode(&modes))
            .await?;

        {
            let mut state = lock_state(&self.state);
            state.screens = state.screens.with_display_modes(&modes);
        }
        Ok(())
    }

    /// Sets every configured screen to `mode` in one request.
    pub async fn set_display_mode_all(&self, mode: DisplayMode) -> Result<()> {
        let modes = self
            .layout
            .tv_ids()
            .map(|tv_id| (tv_id.clone(), mode.clone()))
            .collect();
        self.set_display_mode(modes).await
    }

    pub async fn set_animation_mode(&self, mode: AnimationMode) -> Result<()> {
        let _suspension = self.reconciler.suspend(Duration::ZERO);

        let changed = {
            let mut state = lock_state(&self.state);
            state.animation_lock.acquire();
            let changed = state.animation_mode != mode;
            state.animation_mode = mode.clone();
            changed
        };
        let _release = LockRelease::new(&self.state, LockedField::Animation);
        if changed {
            self.events
                .broadcast(SessionEvent::AnimationModeChanged { mode: mode.clone() });
        }

        self.call("animation_mode", self.backend.set_animation_mode(&mode))
            .await
    }

    /// Button semantics: pressing the active mode turns animations off.
    ///
    /// Returns the mode that was requested.
    pub async fn toggle_animation_mode(&self, mode: AnimationMode) -> Result<AnimationMode> {
        let current = lock_state(&self.state).animation_mode.clone();
        let requested = mode.toggled_from(&current);
        self.set_animation_mode(requested.clone()).await?;
        Ok(requested)
    }

    pub async fn set_screensaver_enabled(&self, enabled: bool) -> Result<()> {
        let _suspension = self.reconciler.suspend(Duration::ZERO);
        self.call("screensaver", self.backend.set_screensaver_enabled(enabled))
            .await?;

        let changed = {
            let mut state = lock_state(&self.state);
            let changed = state.is_screensaver_enabled != enabled;
            state.is_screensaver_enabled = enabled;
            changed
        };
        if changed {
            self.events
                .broadcast(SessionEvent::ScreensaverChanged { enabled });
        }
        Ok(())
    }
}
