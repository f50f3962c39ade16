//! Backend abstraction used by the reconciler and the dispatcher.

mod http;

use std::collections::BTreeMap;

use async_trait::async_trait;

pub use http::{DEFAULT_API_BASE, DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_USER_AGENT, HttpBackend, HttpBackendBuilder};

use crate::errors::Result;
use crate::model::{
    AnimationMode, CommandResponse, DisplayMode, EnqueueRequest, PlaylistVideoId, QueueResponse,
    TvId, VolumeResponse,
};

/// Remote wall controller.
///
/// Implementations return decoded bodies and leave the interpretation of
/// `success` to the caller.
#[async_trait]
pub trait WallBackend: Send + Sync {
    async fn get_queue(&self) -> Result<QueueResponse>;

    async fn get_vol_pct(&self) -> Result<VolumeResponse>;

    async fn skip(&self, playlist_video_id: PlaylistVideoId) -> Result<CommandResponse>;

    async fn remove(&self, playlist_video_id: PlaylistVideoId) -> Result<CommandResponse>;

    async fn set_vol_pct(&self, vol_pct: u8) -> Result<CommandResponse>;

    async fn clear(&self) -> Result<CommandResponse>;

    async fn enqueue(&self, request: &EnqueueRequest) -> Result<CommandResponse>;

    async fn set_display_mode(&self, modes: &BTreeMap<TvId, DisplayMode>) -> Result<CommandResponse>;

    async fn set_animation_mode(&self, mode: &AnimationMode) -> Result<CommandResponse>;

    async fn set_screensaver_enabled(&self, enabled: bool) -> Result<CommandResponse>;
}
