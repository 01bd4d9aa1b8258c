//! Outbound HTTP client.
//!
//! One `HttpTransport` wraps a pooled `reqwest::Client`. Request helpers
//! log failures and return `None`/`false` so adapters can degrade the
//! reply instead of failing the call; only the streaming entry points
//! surface a `TransportError`.

use std::sync::OnceLock;
use std::time::Duration;

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use gptrelay_core::config::{HttpVersionPref, TransportConfig};

use crate::error::TransportError;

/// Raw body chunks of a streamed upstream reply.
pub type ByteStream = BoxStream<'static, Result<Bytes, TransportError>>;

const DEFAULT_CHARSET: &str = "utf-8";

// ─────────────────────────────────────────────
// Builder
// ─────────────────────────────────────────────

/// Certificate handling for outbound TLS.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TlsPolicy {
    #[default]
    Verify,
    /// Accept any certificate. Logged at warn when a client is built.
    Insecure,
}

#[derive(Clone, Debug)]
pub struct TransportBuilder {
    connect_timeout: Duration,
    request_timeout: Option<Duration>,
    http_version: HttpVersionPref,
    proxy: Option<String>,
    tls: TlsPolicy,
    user_agent: String,
}

impl Default for TransportBuilder {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: None,
            http_version: HttpVersionPref::Auto,
            proxy: None,
            tls: TlsPolicy::Verify,
            user_agent: format!("gptrelay/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl TransportBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder seeded from the `transport` config section.
    pub fn from_config(config: &TransportConfig) -> Self {
        let mut builder = Self::default()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .http_version(config.http_version);
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.request_timeout(Duration::from_secs(secs));
        }
        if let Some(ref proxy) = config.proxy {
            builder = builder.proxy(proxy.clone());
        }
        if config.insecure_tls {
            builder = builder.tls(TlsPolicy::Insecure);
        }
        builder
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn http_version(mut self, pref: HttpVersionPref) -> Self {
        self.http_version = pref;
        self
    }

    pub fn proxy(mut self, url: impl Into<String>) -> Self {
        self.proxy = Some(url.into());
        self
    }

    pub fn tls(mut self, policy: TlsPolicy) -> Self {
        self.tls = policy;
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = agent.into();
        self
    }

    pub fn build(self) -> Result<HttpTransport, TransportError> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .user_agent(self.user_agent);

        if let Some(timeout) = self.request_timeout {
            builder = builder.timeout(timeout);
        }

        builder = match self.http_version {
            HttpVersionPref::Auto => builder,
            HttpVersionPref::Http1 => builder.http1_only(),
            HttpVersionPref::Http2 => builder.http2_prior_knowledge(),
        };

        if let Some(url) = self.proxy {
            let proxy = reqwest::Proxy::all(&url)
                .map_err(|source| TransportError::InvalidProxy { url: url.clone(), source })?;
            debug!(proxy = %url, "Outbound proxy enabled");
            builder = builder.proxy(proxy);
        }

        if self.tls == TlsPolicy::Insecure {
            warn!("TLS certificate verification is DISABLED for outbound requests");
            builder = builder.danger_accept_invalid_certs(true);
        }

        let client = builder.build().map_err(TransportError::Build)?;
        Ok(HttpTransport { client })
    }
}

// ─────────────────────────────────────────────
// Shared instances
// ─────────────────────────────────────────────

static SHARED: OnceLock<HttpTransport> = OnceLock::new();
static SHARED_PROXY: OnceLock<HttpTransport> = OnceLock::new();

/// Process-wide direct client with default settings.
pub fn shared() -> Result<&'static HttpTransport, TransportError> {
    if let Some(transport) = SHARED.get() {
        return Ok(transport);
    }
    let built = TransportBuilder::default().build()?;
    Ok(SHARED.get_or_init(|| built))
}

/// Process-wide client routed through `proxy_url`.
///
/// The first successful call fixes the proxy; later calls get the same
/// instance whatever URL they pass.
pub fn shared_proxy(proxy_url: &str) -> Result<&'static HttpTransport, TransportError> {
    if let Some(transport) = SHARED_PROXY.get() {
        return Ok(transport);
    }
    let built = TransportBuilder::default().proxy(proxy_url).build()?;
    Ok(SHARED_PROXY.get_or_init(|| built))
}

/// A private client, for callers that need their own pool or settings.
pub fn dedicated(builder: TransportBuilder) -> Result<HttpTransport, TransportError> {
    builder.build()
}

// ─────────────────────────────────────────────
// HttpTransport
// ─────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub(crate) fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// GET with query parameters; the body is decoded as `charset`
    /// (UTF-8 when `None`).
    pub async fn get_text(
        &self,
        url: &str,
        params: &[(&str, &str)],
        headers: &HeaderMap,
        charset: Option<&str>,
    ) -> Option<String> {
        let request = self.client.get(url).headers(headers.clone()).query(params);
        self.execute_text(request, url, charset).await
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        params: &[(&str, &str)],
        headers: &HeaderMap,
    ) -> Option<T> {
        let text = self.get_text(url, params, headers, None).await?;
        decode_json(url, &text)
    }

    /// POST `application/x-www-form-urlencoded`.
    pub async fn post_form<T: DeserializeOwned>(
        &self,
        url: &str,
        params: &[(&str, &str)],
        headers: &HeaderMap,
    ) -> Option<T> {
        let request = self.client.post(url).headers(headers.clone()).form(params);
        let text = self.execute_text(request, url, None).await?;
        decode_json(url, &text)
    }

    pub async fn post_json<B, T>(&self, url: &str, body: &B, headers: &HeaderMap) -> Option<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let text = self.post_json_text(url, body, headers, None).await?;
        decode_json(url, &text)
    }

    /// POST a JSON body and return the reply text undecoded.
    pub async fn post_json_text<B: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
        headers: &HeaderMap,
        charset: Option<&str>,
    ) -> Option<String> {
        let request = self.client.post(url).headers(headers.clone()).json(body);
        self.execute_text(request, url, charset).await
    }

    /// POST an arbitrary body with an explicit content type.
    pub async fn post_raw(
        &self,
        url: &str,
        body: impl Into<Bytes>,
        content_type: &str,
        headers: &HeaderMap,
    ) -> Option<String> {
        let request = self
            .client
            .post(url)
            .headers(headers.clone())
            .header(CONTENT_TYPE, content_type)
            .body(body.into());
        self.execute_text(request, url, None).await
    }

    /// POST a JSON body and stream the reply. Non-2xx replies are read in
    /// full and returned as `TransportError::Status`.
    pub async fn open_stream<B: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
        headers: &HeaderMap,
    ) -> Result<ByteStream, TransportError> {
        let response = self.send_streaming(url, body, headers).await?;
        Ok(response.bytes_stream().map_err(TransportError::from).boxed())
    }

    /// POST a JSON body and push each reply chunk into `sink`.
    ///
    /// Returns once the upstream body ends or the receiver is dropped.
    pub async fn post_stream<B: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
        headers: &HeaderMap,
        sink: mpsc::Sender<Bytes>,
    ) -> Result<StatusCode, TransportError> {
        let response = self.send_streaming(url, body, headers).await?;
        let status = response.status();
        let mut chunks = response.bytes_stream();

        while let Some(chunk) = chunks.next().await {
            let chunk = chunk?;
            if sink.send(chunk).await.is_err() {
                debug!(url = %url, "Stream receiver dropped, abandoning upstream body");
                break;
            }
        }
        Ok(status)
    }

    pub async fn delete(&self, url: &str, headers: &HeaderMap) -> bool {
        let request = self.client.delete(url).headers(headers.clone());
        self.execute_text(request, url, None).await.is_some()
    }

    async fn send_streaming<B: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
        headers: &HeaderMap,
    ) -> Result<reqwest::Response, TransportError> {
        let response = self
            .client
            .post(url)
            .headers(headers.clone())
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(url = %url, status = %status, body = %body, "Streaming request rejected");
            return Err(TransportError::Status { status, body });
        }
        Ok(response)
    }

    pub(crate) async fn execute_text(
        &self,
        request: RequestBuilder,
        url: &str,
        charset: Option<&str>,
    ) -> Option<String> {
        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                error!(url = %url, error = %e, "HTTP request failed");
                return None;
            }
        };

        let status = response.status();
        let text = match response
            .text_with_charset(charset.unwrap_or(DEFAULT_CHARSET))
            .await
        {
            Ok(t) => t,
            Err(e) => {
                error!(url = %url, status = %status, error = %e, "Failed to read response body");
                return None;
            }
        };

        if !status.is_success() {
            error!(url = %url, status = %status, body = %text, "HTTP error response");
            return None;
        }

        Some(text)
    }
}

fn decode_json<T: DeserializeOwned>(url: &str, text: &str) -> Option<T> {
    match serde_json::from_str(text) {
        Ok(v) => Some(v),
        Err(e) => {
            error!(url = %url, error = %e, "Failed to decode JSON response");
            None
        }
    }
}
