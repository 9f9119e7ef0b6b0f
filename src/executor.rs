//! Per-request render execution.

use crate::error::{Error, Result};
use crate::session::Session;
use crate::surface::Surface;
use crate::{RenderParam, RenderResult};
use headless_chrome::Browser;
use log::debug;
use std::path::Path;
use std::sync::Arc;
use tokio::task;

/// Executes isolated renders against a shared [`Session`].
///
/// The session is injected so services can share one across executors and
/// tests can supply their own.
#[derive(Clone)]
pub struct Renderer {
    session: Arc<Session>,
}

impl Renderer {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Renders `template` with `params` and returns the captured JPEG plus
    /// the completion flag.
    ///
    /// A browser that fails to start is fatal for the request. A template
    /// that never signals completion is not: the capture still runs and the
    /// result comes back flagged incomplete. The rendering surface is closed
    /// on every exit path, errors included.
    pub async fn render(
        &self,
        template: impl AsRef<Path>,
        params: RenderParam,
    ) -> Result<RenderResult> {
        let browser = self.session.ensure_ready().await?;
        let template = template.as_ref().to_path_buf();

        // The whole CDP conversation is blocking; run it on the blocking
        // pool so concurrent renders interleave freely.
        task::spawn_blocking(move || render_blocking(&browser, &template, &params))
            .await
            .map_err(|e| Error::Capture(format!("render task failed: {}", e)))?
    }

    /// Stops the shared browser. A later render starts a fresh one.
    pub async fn shutdown(&self) {
        self.session.shutdown().await;
    }
}

fn render_blocking(browser: &Browser, template: &Path, params: &RenderParam) -> Result<RenderResult> {
    let surface = Surface::open(browser, params.width())?;

    surface.navigate_to_file(template)?;
    surface.inject(&params.injection_payload())?;

    let outcome = surface.wait_for_marker(params.timeout())?;
    let image = surface.capture_jpeg()?;
    debug!(
        "rendered {} ({} bytes, {:?})",
        template.display(),
        image.len(),
        outcome
    );

    Ok(RenderResult { image, outcome })
}
