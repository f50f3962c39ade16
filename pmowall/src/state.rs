//! Session state owned jointly by the poll reconciler and the command dispatcher.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;

use crate::events::SessionEvent;
use crate::lock::{LockState, LockTicket, OptimisticLock};
use crate::model::{
    AnimationMode, BackendScreenFields, DisplayMode, PlaylistEntry, QueueResponse, QueuedVideo,
    TvId, normalize_vol_pct,
};

pub type SharedState = Arc<Mutex<SessionState>>;

/// Locks the session state, recovering from a poisoned mutex.
///
/// The guard must never be held across an `.await`.
pub(crate) fn lock_state(state: &SharedState) -> MutexGuard<'_, SessionState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// State of one screen: backend-reported fields plus the client-owned
/// `loading` flag.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScreenState {
    backend_fields: BackendScreenFields,
    display_mode: Option<DisplayMode>,
    loading: bool,
}

impl ScreenState {
    /// Display mode to render; screens the backend never reported show tiles.
    pub fn display_mode(&self) -> DisplayMode {
        self.display_mode.clone().unwrap_or(DisplayMode::Tile)
    }

    pub fn reported_display_mode(&self) -> Option<&DisplayMode> {
        self.display_mode.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn backend_field(&self, key: &str) -> Option<&Value> {
        self.backend_fields.get(key)
    }

    // Backend keys override ours; keys it did not send are kept.
    fn merge_backend(&mut self, fields: &BackendScreenFields) {
        for (key, value) in fields {
            self.backend_fields.insert(key.clone(), value.clone());
        }
        if let Some(Value::String(mode)) = fields.get("display_mode") {
            self.display_mode = Some(DisplayMode::from(mode.clone()));
        }
        if let Some(Value::Bool(loading)) = fields.get("loading") {
            self.loading = *loading;
        }
    }

    fn set_display_mode(&mut self, mode: &DisplayMode) {
        self.backend_fields.insert(
            "display_mode".to_string(),
            Value::String(mode.as_str().to_string()),
        );
        self.display_mode = Some(mode.clone());
    }
}

/// Copy-on-write map of screen states.
///
/// Every update returns a new value; a snapshot handed out earlier is
/// never modified.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScreenStates(Arc<BTreeMap<TvId, ScreenState>>);

impl ScreenStates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, tv_id: &TvId) -> Option<&ScreenState> {
        self.0.get(tv_id)
    }

    pub fn contains(&self, tv_id: &TvId) -> bool {
        self.0.contains_key(tv_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TvId, &ScreenState)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn shares_storage_with(&self, other: &ScreenStates) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    fn updated(&self, update: impl FnOnce(&mut BTreeMap<TvId, ScreenState>)) -> Self {
        let mut next = Arc::clone(&self.0);
        update(Arc::make_mut(&mut next));
        Self(next)
    }

    pub fn merged_with_backend(&self, settings: &BTreeMap<TvId, BackendScreenFields>) -> Self {
        if settings.is_empty() {
            return self.clone();
        }
        self.updated(|screens| {
            for (tv_id, fields) in settings {
                screens.entry(tv_id.clone()).or_default().merge_backend(fields);
            }
        })
    }

    pub fn with_loading<'a>(&self, tv_ids: impl IntoIterator<Item = &'a TvId>, loading: bool) -> Self {
        self.updated(|screens| {
            for tv_id in tv_ids {
                screens.entry(tv_id.clone()).or_default().loading = loading;
            }
        })
    }

    pub fn with_display_modes(&self, modes: &BTreeMap<TvId, DisplayMode>) -> Self {
        self.updated(|screens| {
            for (tv_id, mode) in modes {
                screens.entry(tv_id.clone()).or_default().set_display_mode(mode);
            }
        })
    }
}

/// Lock snapshots taken before a poll request is dispatched.
#[derive(Clone, Copy, Debug)]
pub struct PollTickets {
    volume: LockTicket,
    animation: LockTicket,
}

#[derive(Clone, Debug)]
pub struct SessionState {
    pub playlist_current_video: Option<PlaylistEntry>,
    /// Queue view, without the playing entry.
    pub playlist_videos: Vec<PlaylistEntry>,
    pub vol_pct: Option<u8>,
    pub is_screensaver_enabled: bool,
    pub screens: ScreenStates,
    pub animation_mode: AnimationMode,
    /// Videos this client queued successfully, oldest first.
    pub last_queued: Vec<QueuedVideo>,
    pub(crate) volume_lock: OptimisticLock,
    pub(crate) animation_lock: OptimisticLock,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new(None)
    }
}

impl SessionState {
    /// `volume_fallback` is the delay after which a releasable volume lock
    /// is force-unlocked.
    pub fn new(volume_fallback: Option<Duration>) -> Self {
        Self {
            playlist_current_video: None,
            playlist_videos: Vec::new(),
            vol_pct: None,
            is_screensaver_enabled: true,
            screens: ScreenStates::new(),
            animation_mode: AnimationMode::None,
            last_queued: Vec::new(),
            volume_lock: volume_fallback.map_or_else(OptimisticLock::new, OptimisticLock::with_fallback),
            animation_lock: OptimisticLock::new(),
        }
    }

    /// Pre-populates one screen entry per configured screen.
    pub fn with_screens<'a>(mut self, tv_ids: impl IntoIterator<Item = &'a TvId>) -> Self {
        self.screens = self.screens.with_loading(tv_ids, false);
        self
    }

    pub fn volume_lock_state(&self) -> LockState {
        self.volume_lock.state()
    }

    pub fn animation_lock_state(&self) -> LockState {
        self.animation_lock.state()
    }

    pub fn poll_tickets(&mut self, now: Instant) -> PollTickets {
        PollTickets {
            volume: self.volume_lock.ticket(now),
            animation: self.animation_lock.ticket(now),
        }
    }

    /// Merges a successful `GET /queue` response and returns what changed.
    pub fn apply_poll(&mut self, response: QueueResponse, tickets: PollTickets) -> Vec<SessionEvent> {
        let mut events = Vec::new();

        let mut queue = response.queue;
        let current = queue.iter().find(|entry| entry.is_playing()).cloned();
        if let Some(current) = &current {
            queue.retain(|entry| entry.playlist_video_id != current.playlist_video_id);
        }
        if current != self.playlist_current_video || queue != self.playlist_videos {
            events.push(SessionEvent::QueueChanged {
                current: current.clone(),
                queued: queue.clone(),
            });
        }
        self.playlist_current_video = current;
        self.playlist_videos = queue;

        let screens = self.screens.merged_with_backend(&response.tv_settings);
        if screens != self.screens {
            events.push(SessionEvent::ScreensChanged);
        }
        self.screens = screens;

        if self.volume_lock.admit(tickets.volume) {
            if let Some(raw) = response.vol_pct {
                let vol_pct = normalize_vol_pct(raw);
                if self.vol_pct != Some(vol_pct) {
                    events.push(SessionEvent::VolumeChanged { vol_pct });
                }
                self.vol_pct = Some(vol_pct);
            }
        }

        if self.animation_lock.admit(tickets.animation) {
            if let Some(mode) = response.animation_mode {
                if self.animation_mode != mode {
                    events.push(SessionEvent::AnimationModeChanged { mode: mode.clone() });
                }
                self.animation_mode = mode;
            }
        }

        if let Some(enabled) = response.is_screensaver_enabled {
            if self.is_screensaver_enabled != enabled {
                events.push(SessionEvent::ScreensaverChanged { enabled });
            }
            self.is_screensaver_enabled = enabled;
        }

        events
    }
}
