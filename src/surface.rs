//! Request-scoped rendering surfaces.
//!
//! A [`Surface`] is one isolated tab in the shared browser, exclusively
//! owned by a single render request. Dropping it closes the tab, whichever
//! way the request exits.

use crate::error::{Error, Result};
use crate::{WaitOutcome, COMPLETION_MARKER_ID};
use base64::Engine as Base64Engine;
use headless_chrome::browser::tab::Tab;
use headless_chrome::protocol::cdp::{Emulation, Page};
use headless_chrome::Browser;
use log::{debug, warn};
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Quality of the lossy JPEG capture.
const JPEG_QUALITY: u32 = 80;

/// Initial viewport height. Capture clips to the laid-out document height,
/// so only the width is authoritative.
const VIEWPORT_HEIGHT: u32 = 100;

/// How often the completion marker is probed while waiting.
const MARKER_POLL_INTERVAL: Duration = Duration::from_millis(50);

pub(crate) struct Surface {
    tab: Arc<Tab>,
    width: u32,
}

impl Surface {
    /// Opens a fresh tab sized to `{width, 100}`.
    ///
    /// The viewport is emulated per target, so concurrent surfaces with
    /// different widths do not interfere.
    pub fn open(browser: &Browser, width: u32) -> Result<Self> {
        let tab = browser
            .new_tab()
            .map_err(|e| Error::Navigation(format!("failed to open tab: {}", e)))?;

        let surface = Self { tab, width };
        surface.set_viewport(width, VIEWPORT_HEIGHT)?;
        Ok(surface)
    }

    fn set_viewport(&self, width: u32, height: u32) -> Result<()> {
        self.tab
            .call_method(Emulation::SetDeviceMetricsOverride {
                width,
                height,
                device_scale_factor: 1.0,
                mobile: false,
                scale: None,
                screen_width: None,
                screen_height: None,
                position_x: None,
                position_y: None,
                dont_set_visible_size: None,
                screen_orientation: None,
                viewport: None,
                display_feature: None,
                device_posture: None,
            })
            .map_err(|e| Error::Navigation(format!("failed to set viewport: {}", e)))?;
        Ok(())
    }

    /// Navigates to a template on the local filesystem.
    pub fn navigate_to_file(&self, path: &Path) -> Result<()> {
        let absolute = path.canonicalize().map_err(|e| {
            Error::Navigation(format!("cannot resolve template {}: {}", path.display(), e))
        })?;
        let url = url::Url::from_file_path(&absolute).map_err(|_| {
            Error::Navigation(format!("not a loadable file path: {}", absolute.display()))
        })?;

        self.tab
            .navigate_to(url.as_str())
            .map_err(|e| Error::Navigation(format!("navigation failed: {}", e)))?;
        self.tab
            .wait_until_navigated()
            .map_err(|e| Error::Navigation(format!("wait for navigation failed: {}", e)))?;
        Ok(())
    }

    /// Hands the payload to the template's `window.init` entry point.
    pub fn inject(&self, payload: &Map<String, Value>) -> Result<()> {
        let json = serde_json::to_string(payload)
            .map_err(|e| Error::Script(format!("payload serialization failed: {}", e)))?;
        let script = format!("((data) => window.init(data))({json})");

        self.tab
            .evaluate(&script, true)
            .map_err(|e| Error::Script(format!("window.init failed: {}", e)))?;
        Ok(())
    }

    /// Polls for the completion marker until it attaches or `timeout` runs
    /// out.
    ///
    /// Timing out resolves to [`WaitOutcome::TimedOut`]; only a failing
    /// probe is an error.
    pub fn wait_for_marker(&self, timeout: Duration) -> Result<WaitOutcome> {
        let deadline = Instant::now() + timeout;
        let probe = format!("document.getElementById({COMPLETION_MARKER_ID:?}) !== null");

        loop {
            let attached = self
                .tab
                .evaluate(&probe, false)
                .map_err(|e| Error::Script(format!("marker probe failed: {}", e)))?
                .value
                .and_then(|v| v.as_bool())
                .unwrap_or(false);

            if attached {
                return Ok(WaitOutcome::Completed);
            }

            let now = Instant::now();
            if now >= deadline {
                debug!("completion marker not observed within {:?}", timeout);
                return Ok(WaitOutcome::TimedOut);
            }
            std::thread::sleep(MARKER_POLL_INTERVAL.min(deadline - now));
        }
    }

    /// Captures the full document as a JPEG, regardless of how the wait
    /// ended.
    pub fn capture_jpeg(&self) -> Result<Vec<u8>> {
        let height = self.document_height()?;
        let capture = self
            .tab
            .call_method(Page::CaptureScreenshot {
                format: Some(Page::CaptureScreenshotFormatOption::Jpeg),
                quality: Some(JPEG_QUALITY),
                clip: Some(Page::Viewport {
                    x: 0.0,
                    y: 0.0,
                    width: self.width as f64,
                    height,
                    scale: 1.0,
                }),
                from_surface: Some(true),
                capture_beyond_viewport: Some(true),
                optimize_for_speed: None,
            })
            .map_err(|e| Error::Capture(format!("screenshot failed: {}", e)))?;

        base64::engine::general_purpose::STANDARD
            .decode(capture.data)
            .map_err(|e| Error::Capture(format!("screenshot payload was not base64: {}", e)))
    }

    /// Height the document laid out to, in CSS pixels. The declared viewport
    /// height is only a starting point; templates grow past it.
    fn document_height(&self) -> Result<f64> {
        let height = self
            .tab
            .evaluate(
                "Math.max(document.documentElement.scrollHeight, document.body ? document.body.scrollHeight : 0)",
                false,
            )
            .map_err(|e| Error::Capture(format!("failed to measure document: {}", e)))?
            .value
            .and_then(|v| v.as_f64())
            .unwrap_or(f64::from(VIEWPORT_HEIGHT));

        Ok(height.max(1.0))
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        // Fire-and-forget close; a request must never leak its tab.
        if let Err(e) = self.tab.close(true) {
            warn!("failed to close rendering surface: {}", e);
        }
    }
}
