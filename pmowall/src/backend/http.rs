//! HTTP client for the wall controller API

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;
use url::Url;

use super::WallBackend;
use crate::errors::{Result, WallError};
use crate::model::{
    AnimationMode, CommandResponse, DisplayMode, EnqueueRequest, PlaylistVideoId, QueueResponse,
    TvId, VolumeResponse,
};

/// Default controller API base URL
pub const DEFAULT_API_BASE: &str = "http://piwall.tv/api";

/// Default timeout for a single API call
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default User-Agent
pub const DEFAULT_USER_AGENT: &str = "pmowall/0.1.0";

/// Wall controller reached over HTTP/JSON.
///
/// # Example
///
/// ```no_run
/// use pmowall::{HttpBackend, WallBackend};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let backend = HttpBackend::builder()
///         .api_base("http://piwall.local/api")
///         .build()?;
///     let queue = backend.get_queue().await?;
///     println!("{} entries", queue.queue.len());
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    api_base: String,
}

impl HttpBackend {
    /// Create a builder for configuring the backend
    pub fn builder() -> HttpBackendBuilder {
        HttpBackendBuilder::default()
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn endpoint_url(&self, endpoint: &str) -> Result<Url> {
        Ok(Url::parse(&format!("{}{}", self.api_base, endpoint))?)
    }

    async fn perform<B, T>(&self, method: Method, endpoint: &str, body: Option<&B>) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned + Default,
    {
        let url = self.endpoint_url(endpoint)?;
        debug!("{} {}", method, url);

        let mut request = self.client.request(method, url);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(WallError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            });
        }

        // Some endpoints answer 2xx with an empty body
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(T::default());
        }
        Ok(serde_json::from_str(&text)?)
    }

    async fn post<B>(&self, endpoint: &str, body: &B) -> Result<CommandResponse>
    where
        B: Serialize + ?Sized,
    {
        self.perform(Method::POST, endpoint, Some(body)).await
    }
}

#[async_trait]
impl WallBackend for HttpBackend {
    async fn get_queue(&self) -> Result<QueueResponse> {
        self.perform::<(), _>(Method::GET, "/queue", None).await
    }

    async fn get_vol_pct(&self) -> Result<VolumeResponse> {
        self.perform::<(), _>(Method::GET, "/vol_pct", None).await
    }

    async fn skip(&self, playlist_video_id: PlaylistVideoId) -> Result<CommandResponse> {
        self.post("/skip", &json!({ "playlist_video_id": playlist_video_id }))
            .await
    }

    async fn remove(&self, playlist_video_id: PlaylistVideoId) -> Result<CommandResponse> {
        self.post("/remove", &json!({ "playlist_video_id": playlist_video_id }))
            .await
    }

    async fn set_vol_pct(&self, vol_pct: u8) -> Result<CommandResponse> {
        self.post("/vol_pct", &json!({ "vol_pct": vol_pct })).await
    }

    async fn clear(&self) -> Result<CommandResponse> {
        self.perform::<(), _>(Method::POST, "/clear", None).await
    }

    async fn enqueue(&self, request: &EnqueueRequest) -> Result<CommandResponse> {
        self.post("/queue", request).await
    }

    async fn set_display_mode(&self, modes: &BTreeMap<TvId, DisplayMode>) -> Result<CommandResponse> {
        self.post("/display_mode", modes).await
    }

    async fn set_animation_mode(&self, mode: &AnimationMode) -> Result<CommandResponse> {
        self.post("/animation_mode", &json!({ "animation_mode": mode }))
            .await
    }

    async fn set_screensaver_enabled(&self, enabled: bool) -> Result<CommandResponse> {
        self.post("/screensaver", &json!({ "is_screensaver_enabled": enabled }))
            .await
    }
}

/// Builder for [`HttpBackend`]
pub struct HttpBackendBuilder {
    client: Option<Client>,
    api_base: String,
    request_timeout: Duration,
    user_agent: String,
}

impl Default for HttpBackendBuilder {
    fn default() -> Self {
        Self {
            client: None,
            api_base: DEFAULT_API_BASE.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl HttpBackendBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a custom HTTP client; timeout and user agent are then ignored
    pub fn client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Set the API base URL, e.g. `http://piwall.local/api`
    pub fn api_base(mut self, url: impl Into<String>) -> Self {
        self.api_base = url.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn build(self) -> Result<HttpBackend> {
        let api_base = self.api_base.trim_end_matches('/').to_string();
        Url::parse(&api_base)?;

        let client = match self.client {
            Some(client) => client,
            None => Client::builder()
                .user_agent(&self.user_agent)
                .timeout(self.request_timeout)
                .build()?,
        };

        Ok(HttpBackend { client, api_base })
    }
}
