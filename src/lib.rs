//! Tabshot Render Engine
//!
//! Renders structured data into a raster image: an HTML template is loaded
//! into a shared headless Chrome instance, the data is injected as a
//! client-visible object, and a full-page JPEG is captured once the template
//! signals completion (or the wait times out).
//!
//! # Overview
//!
//! - **[`Session`]**: owns the one shared browser process — started lazily on
//!   the first render, reused by every request, torn down only by an explicit
//!   [`Session::shutdown`].
//! - **[`Renderer`]**: runs one render per request on its own isolated tab,
//!   which is always closed before the request finishes.
//! - **[`RenderParam`]** / **[`RenderResult`]**: the per-request contract —
//!   payload, width, timeout and callback host in; image bytes plus a
//!   completion flag out.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tabshot::{RenderParam, Renderer, Session};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let renderer = Renderer::new(Arc::new(Session::default()));
//!
//! let params = RenderParam::builder(&serde_json::json!({ "title": "hello" }))?
//!     .width(550)
//!     .build();
//!
//! let result = renderer.render("templates/content.html", params).await?;
//! println!("complete: {}, {} bytes", result.is_complete(), result.image.len());
//! # Ok(())
//! # }
//! ```
//!
//! # Template contract
//!
//! A template must expose `window.init(data)` and, once its own rendering is
//! done, attach an element with id [`COMPLETION_MARKER_ID`]. A template that
//! never attaches the marker still produces an image; the result is merely
//! flagged as incomplete.

pub mod config;
pub mod error;
pub mod executor;
pub mod session;
mod surface;

pub use config::ServiceConfig;
pub use error::{Error, Result};
pub use executor::Renderer;
pub use session::{Session, SessionOptions};

use serde::Serialize;
use serde_json::{Map, Value};
use std::time::Duration;

/// Fallback viewport width when a request does not specify one.
pub const DEFAULT_PAGE_WIDTH: u32 = 800;

/// Default completion-wait timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Id of the DOM element a template attaches to signal it has finished its
/// asynchronous rendering work.
pub const COMPLETION_MARKER_ID: &str = "render-complete";

/// Data that can be handed to a template's `window.init` entry point.
///
/// The payload must serialize to a JSON object so the engine can merge its
/// own keys (currently `host`) into it before injection. The blanket impl
/// covers any `Serialize` type, including `serde_json::Value`.
pub trait TemplateData {
    /// Converts the value into the plain key-value mapping injected into the
    /// page.
    fn to_payload(&self) -> Result<Map<String, Value>>;
}

impl<T: Serialize> TemplateData for T {
    fn to_payload(&self) -> Result<Map<String, Value>> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(Error::Script(format!(
                "template payload must be a JSON object, got {}",
                json_kind(&other)
            ))),
            Err(e) => Err(Error::Script(format!("payload serialization failed: {}", e))),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Per-request render configuration.
///
/// Immutable once built; construct one instance per request via
/// [`RenderParam::builder`].
#[derive(Debug, Clone)]
pub struct RenderParam {
    data: Map<String, Value>,
    width: Option<u32>,
    timeout: Duration,
    host: String,
}

impl RenderParam {
    /// Starts building a param set from the template payload.
    ///
    /// Fails if the payload does not serialize to a JSON object.
    pub fn builder<D>(data: &D) -> Result<RenderParamBuilder>
    where
        D: TemplateData + ?Sized,
    {
        Ok(RenderParamBuilder {
            data: data.to_payload()?,
            width: None,
            timeout: DEFAULT_TIMEOUT,
            host: None,
        })
    }

    /// Viewport width for this request, falling back to [`DEFAULT_PAGE_WIDTH`].
    pub fn width(&self) -> u32 {
        self.width.unwrap_or(DEFAULT_PAGE_WIDTH)
    }

    /// How long to wait for the completion marker.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Base URL the template may use for callback resource requests.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The object actually handed to `window.init`: the caller payload with
    /// the engine-controlled `host` key merged in. A caller-supplied `host`
    /// key is overwritten.
    pub fn injection_payload(&self) -> Map<String, Value> {
        let mut payload = self.data.clone();
        payload.insert("host".to_string(), Value::String(self.host.clone()));
        payload
    }
}

/// Builder for [`RenderParam`].
#[derive(Debug)]
pub struct RenderParamBuilder {
    data: Map<String, Value>,
    width: Option<u32>,
    timeout: Duration,
    host: Option<String>,
}

impl RenderParamBuilder {
    /// Explicit viewport width. Call sites with a template-family default
    /// pass `request_width.unwrap_or(family_default)` here.
    pub fn width(mut self, width: u32) -> Self {
        self.width = Some(width);
        self
    }

    /// Completion-wait timeout (default 5000 ms).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Callback base URL injected as the `host` key. Defaults to the URL
    /// derived from the default [`ServiceConfig`].
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Derives the `host` value from a service configuration.
    pub fn host_from(self, config: &ServiceConfig) -> Self {
        self.host(config.public_base_url())
    }

    pub fn build(self) -> RenderParam {
        RenderParam {
            data: self.data,
            width: self.width,
            timeout: self.timeout,
            host: self
                .host
                .unwrap_or_else(|| ServiceConfig::default().public_base_url()),
        }
    }
}

/// Outcome of the completion-marker wait.
///
/// Timing out is an expected outcome, not an error: the capture still runs
/// and shows whatever had rendered when the wait gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The marker element attached within the timeout.
    Completed,
    /// The timeout elapsed with no marker in sight.
    TimedOut,
}

/// A captured render: JPEG bytes plus how the completion wait ended.
#[derive(Debug, Clone)]
pub struct RenderResult {
    /// Full-page screenshot, JPEG encoded.
    pub image: Vec<u8>,
    /// Whether the template signalled completion in time.
    pub outcome: WaitOutcome,
}

impl RenderResult {
    pub fn is_complete(&self) -> bool {
        self.outcome == WaitOutcome::Completed
    }

    /// Splits into the `(image bytes, completion flag)` pair callers forward
    /// to the HTTP layer.
    pub fn into_parts(self) -> (Vec<u8>, bool) {
        let complete = self.is_complete();
        (self.image, complete)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Serialize)]
    struct ContentData {
        title: String,
        text: String,
        images: Vec<String>,
    }

    #[test]
    fn test_param_defaults() {
        let params = RenderParam::builder(&json!({})).unwrap().build();
        assert_eq!(params.width(), DEFAULT_PAGE_WIDTH);
        assert_eq!(params.timeout(), Duration::from_millis(5000));
        assert_eq!(params.host(), "http://localhost:39334");
    }

    #[test]
    fn test_width_override() {
        let params = RenderParam::builder(&json!({})).unwrap().width(550).build();
        assert_eq!(params.width(), 550);
    }

    #[test]
    fn test_engine_owns_host_key() {
        let params = RenderParam::builder(&json!({ "host": "http://attacker.example" }))
            .unwrap()
            .host("http://localhost:39334")
            .build();

        let payload = params.injection_payload();
        assert_eq!(
            payload.get("host").and_then(Value::as_str),
            Some("http://localhost:39334")
        );
    }

    #[test]
    fn test_injection_payload_does_not_mutate_params() {
        let params = RenderParam::builder(&json!({ "title": "a" }))
            .unwrap()
            .host("http://localhost:1")
            .build();

        let first = params.injection_payload();
        let second = params.injection_payload();
        assert_eq!(first, second);
        // The original payload map never grows a host key.
        assert!(!params.data.contains_key("host"));
    }

    #[test]
    fn test_typed_payload_flattens() {
        let data = ContentData {
            title: "hello".to_string(),
            text: "body".to_string(),
            images: vec!["a.png".to_string()],
        };

        let payload = data.to_payload().unwrap();
        assert_eq!(payload.get("title").and_then(Value::as_str), Some("hello"));
        assert_eq!(payload.get("images").and_then(Value::as_array).map(Vec::len), Some(1));
    }

    #[test]
    fn test_non_object_payload_rejected() {
        let err = RenderParam::builder(&json!([1, 2, 3])).unwrap_err();
        assert!(matches!(err, Error::Script(_)), "unexpected error: {err:?}");

        let err = RenderParam::builder(&json!("just a string")).unwrap_err();
        assert!(err.to_string().contains("JSON object"));
    }

    #[test]
    fn test_host_from_config() {
        let config = ServiceConfig {
            host: "0.0.0.0".to_string(),
            port: 39334,
            key: String::new(),
        };
        let params = RenderParam::builder(&json!({}))
            .unwrap()
            .host_from(&config)
            .build();
        assert_eq!(params.host(), "http://localhost:39334");
    }
}
