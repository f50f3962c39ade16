//! Wire and domain types shared by the backend, the reconciler and the dispatcher.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::errors::{Result, WallError};

/// Stable identifier of one physical screen, e.g. `piwall1.local_1`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TvId(pub String);

impl TvId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TvId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TvId {
    fn from(value: &str) -> Self {
        TvId(value.to_string())
    }
}

impl From<String> for TvId {
    fn from(value: String) -> Self {
        TvId(value)
    }
}

/// Backend identity of a queue entry, stable across polls.
pub type PlaylistVideoId = i64;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaylistStatus {
    #[serde(rename = "STATUS_QUEUED")]
    Queued,
    #[serde(rename = "STATUS_PLAYING")]
    Playing,
    /// Any status this client does not act upon (done, deleted, ...).
    #[serde(other)]
    Other,
}

/// One entry of the backend playlist as returned by `GET /queue`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlaylistEntry {
    pub playlist_video_id: PlaylistVideoId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub thumbnail: String,
    #[serde(default, rename = "url", deserialize_with = "null_as_default")]
    pub video_url: String,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub priority: i64,
    #[serde(default)]
    pub color_mode: Option<String>,
    #[serde(default)]
    pub create_date: Option<String>,
    pub status: PlaylistStatus,
}

// The playlist columns are nullable: `null` reads as the empty value.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl PlaylistEntry {
    pub fn is_playing(&self) -> bool {
        self.status == PlaylistStatus::Playing
    }
}

/// Per-screen rendering mode.
///
/// Tile: the screen shows its slice of the whole projected frame.
/// Repeat: the screen shows the whole frame cropped to its own aspect ratio.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DisplayMode {
    Tile,
    Repeat,
    /// Modes introduced by newer backends, kept verbatim.
    Other(String),
}

impl DisplayMode {
    pub fn as_str(&self) -> &str {
        match self {
            DisplayMode::Tile => "DISPLAY_MODE_TILE",
            DisplayMode::Repeat => "DISPLAY_MODE_REPEAT",
            DisplayMode::Other(raw) => raw,
        }
    }
}

impl From<String> for DisplayMode {
    fn from(value: String) -> Self {
        match value.as_str() {
            "DISPLAY_MODE_TILE" => DisplayMode::Tile,
            "DISPLAY_MODE_REPEAT" => DisplayMode::Repeat,
            _ => DisplayMode::Other(value),
        }
    }
}

impl From<DisplayMode> for String {
    fn from(value: DisplayMode) -> Self {
        value.as_str().to_string()
    }
}

/// Global wall animation, mutually exclusive with manual per-screen modes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AnimationMode {
    #[default]
    None,
    /// Pseudo mode: every screen in tile mode.
    Tile,
    /// Pseudo mode: every screen in repeat mode.
    Repeat,
    /// Cycles the whole wall between tile and repeat.
    TileRepeat,
    Fullscreen,
    FullscreenTile,
    Spiral,
    Unknown(String),
}

impl AnimationMode {
    pub fn as_str(&self) -> &str {
        match self {
            AnimationMode::None => "ANIMATION_MODE_NONE",
            AnimationMode::Tile => "ANIMATION_MODE_TILE",
            AnimationMode::Repeat => "ANIMATION_MODE_REPEAT",
            AnimationMode::TileRepeat => "ANIMATION_MODE_TILE_REPEAT",
            AnimationMode::Fullscreen => "ANIMATION_MODE_FULLSCREEN",
            AnimationMode::FullscreenTile => "ANIMATION_MODE_FULLSCREEN_TILE",
            AnimationMode::Spiral => "ANIMATION_MODE_SPIRAL",
            AnimationMode::Unknown(raw) => raw,
        }
    }

    /// Mode to request when the user presses the button for `self` while
    /// `current` is active: pressing the active mode turns animations off.
    pub fn toggled_from(self, current: &AnimationMode) -> AnimationMode {
        if &self == current {
            AnimationMode::None
        } else {
            self
        }
    }
}

impl From<String> for AnimationMode {
    fn from(value: String) -> Self {
        match value.as_str() {
            "ANIMATION_MODE_NONE" => AnimationMode::None,
            "ANIMATION_MODE_TILE" => AnimationMode::Tile,
            "ANIMATION_MODE_REPEAT" => AnimationMode::Repeat,
            "ANIMATION_MODE_TILE_REPEAT" => AnimationMode::TileRepeat,
            "ANIMATION_MODE_FULLSCREEN" => AnimationMode::Fullscreen,
            "ANIMATION_MODE_FULLSCREEN_TILE" => AnimationMode::FullscreenTile,
            "ANIMATION_MODE_SPIRAL" => AnimationMode::Spiral,
            _ => AnimationMode::Unknown(value),
        }
    }
}

impl From<AnimationMode> for String {
    fn from(value: AnimationMode) -> Self {
        value.as_str().to_string()
    }
}

/// Color treatment requested at enqueue time (`color`, `bw`, ...).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColorMode(pub String);

impl Default for ColorMode {
    fn default() -> Self {
        ColorMode("color".to_string())
    }
}

impl fmt::Display for ColorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A video picked from search results, ready to be queued.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueueableVideo {
    pub video_url: String,
    pub thumbnail: String,
    pub title: String,
    pub duration: String,
}

/// A video this client successfully queued, with the color mode it used.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueuedVideo {
    pub video: QueueableVideo,
    pub color_mode: ColorMode,
}

/// Body of `POST /queue`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EnqueueRequest {
    pub url: String,
    pub color_mode: ColorMode,
    pub thumbnail: String,
    pub title: String,
    pub duration: String,
}

impl EnqueueRequest {
    pub fn new(video: &QueueableVideo, color_mode: &ColorMode) -> Self {
        Self {
            url: video.video_url.clone(),
            color_mode: color_mode.clone(),
            thumbnail: video.thumbnail.clone(),
            title: video.title.clone(),
            duration: video.duration.clone(),
        }
    }
}

/// Raw per-screen settings as sent by the backend, keyed by field name.
pub type BackendScreenFields = Map<String, Value>;

/// Response of `GET /queue`. Every field defaults so a partial or empty
/// body decodes to "no data" instead of failing.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct QueueResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub queue: Vec<PlaylistEntry>,
    #[serde(default)]
    pub vol_pct: Option<f64>,
    #[serde(default)]
    pub is_screensaver_enabled: Option<bool>,
    #[serde(default)]
    pub tv_settings: BTreeMap<TvId, BackendScreenFields>,
    #[serde(default)]
    pub animation_mode: Option<AnimationMode>,
}

/// Response of the mutating endpoints.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct CommandResponse {
    #[serde(default)]
    pub success: bool,
}

impl CommandResponse {
    /// Turns a missing or false `success` into [`WallError::Rejected`].
    pub fn into_result(self, command: &str) -> Result<()> {
        if self.success {
            Ok(())
        } else {
            Err(WallError::rejected(command))
        }
    }
}

/// Response of `GET /vol_pct`.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct VolumeResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub vol_pct: Option<f64>,
}

/// Normalizes a backend volume (a float) to a whole percentage.
pub fn normalize_vol_pct(raw: f64) -> u8 {
    if !raw.is_finite() {
        return 0;
    }
    raw.round().clamp(0.0, 100.0) as u8
}
