//! Browser session lifecycle.
//!
//! One Chrome process is shared by every render request for the lifetime of
//! the service. It is launched lazily on first use, guarded by a startup
//! mutex so racing requests cannot launch twice, and torn down only by an
//! explicit [`Session::shutdown`].

use crate::error::{Error, Result};
use headless_chrome::{Browser, LaunchOptions};
use log::{debug, info};
use std::ffi::{OsStr, OsString};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task;

/// Launch configuration for the shared browser.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Explicit Chrome/Chromium executable; auto-detected when `None`.
    pub chrome_path: Option<PathBuf>,
    /// Extra flags appended to the browser command line.
    pub extra_args: Vec<OsString>,
    /// How long the driver connection may sit idle before it is dropped.
    /// The session is service-lifetime, so the default is a day rather than
    /// the driver's much shorter default.
    pub idle_timeout: Duration,
    /// Chromium sandbox. Off by default: the engine commonly runs inside
    /// containers without a sandbox namespace, where a sandboxed launch
    /// fails outright.
    pub sandbox: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            chrome_path: None,
            extra_args: Vec::new(),
            idle_timeout: Duration::from_secs(86_400),
            sandbox: false,
        }
    }
}

/// The single shared browser instance for the service's lifetime.
///
/// Owns the underlying process handle exclusively; executors only ever see
/// cloned handles scoped to one request. Create one `Session`, wrap it in an
/// `Arc`, and hand it to [`crate::Renderer`].
pub struct Session {
    options: SessionOptions,
    /// Serializes startup and shutdown. Never held during a render.
    startup: Mutex<()>,
    ready: AtomicBool,
    browser: RwLock<Option<Arc<Browser>>>,
    launches: AtomicU32,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(SessionOptions::default())
    }
}

impl Session {
    pub fn new(options: SessionOptions) -> Self {
        Self {
            options,
            startup: Mutex::new(()),
            ready: AtomicBool::new(false),
            browser: RwLock::new(None),
            launches: AtomicU32::new(0),
        }
    }

    /// Returns a handle to the running browser, launching it on first use.
    ///
    /// The fast path is a single atomic load. Racing first-time callers are
    /// serialized on the startup mutex and re-check readiness after
    /// acquiring it, so at most one launch is ever in flight; they all
    /// observe the same started browser or the same startup failure. A
    /// failed launch leaves the session not-ready, and the next call simply
    /// tries again.
    pub async fn ensure_ready(&self) -> Result<Arc<Browser>> {
        if self.ready.load(Ordering::Acquire) {
            return self.handle();
        }

        let _guard = self.startup.lock().await;
        if self.ready.load(Ordering::Acquire) {
            return self.handle();
        }

        let options = self.options.clone();
        let browser = task::spawn_blocking(move || launch(&options))
            .await
            .map_err(|e| Error::Startup(format!("launch task failed: {}", e)))??;

        let browser = Arc::new(browser);
        *self.browser.write().expect("browser slot lock poisoned") = Some(browser.clone());
        self.launches.fetch_add(1, Ordering::Relaxed);
        // Publish readiness only after the slot holds a fully started browser.
        self.ready.store(true, Ordering::Release);
        info!("browser session started");

        Ok(browser)
    }

    fn handle(&self) -> Result<Arc<Browser>> {
        self.browser
            .read()
            .expect("browser slot lock poisoned")
            .clone()
            .ok_or_else(|| Error::Startup("session marked ready without a browser".to_string()))
    }

    /// Whether the shared browser is currently up.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// How many browser processes this session has launched. Stays at one
    /// for the life of the service unless `shutdown` is followed by more
    /// renders.
    pub fn launches(&self) -> u32 {
        self.launches.load(Ordering::Relaxed)
    }

    /// Stops the browser if it is running.
    ///
    /// Safe to call before any start and safe to call repeatedly; both are
    /// no-ops. A later [`Session::ensure_ready`] starts a fresh browser.
    /// Callers are responsible for not shutting down while renders are in
    /// flight; requests still holding a handle keep the process alive until
    /// they finish.
    pub async fn shutdown(&self) {
        let _guard = self.startup.lock().await;

        self.ready.store(false, Ordering::Release);
        let browser = self
            .browser
            .write()
            .expect("browser slot lock poisoned")
            .take();

        if let Some(browser) = browser {
            debug!("closing browser session");
            // Dropping the last handle terminates the child process.
            drop(browser);
        }
    }
}

/// Two-phase startup: resolve the executable and assemble launch options,
/// then spawn the process and complete the driver handshake. Nothing is
/// published on failure, so a retry starts from scratch.
fn launch(options: &SessionOptions) -> Result<Browser> {
    let path = match &options.chrome_path {
        Some(path) => path.clone(),
        None => headless_chrome::browser::default_executable().map_err(Error::Startup)?,
    };

    let args: Vec<&OsStr> = options.extra_args.iter().map(OsString::as_os_str).collect();
    let launch_options = LaunchOptions::default_builder()
        .headless(true)
        .path(Some(path))
        .sandbox(options.sandbox)
        .idle_browser_timeout(options.idle_timeout)
        .args(args)
        .build()
        .map_err(|e| Error::Startup(format!("failed to build launch options: {}", e)))?;

    debug!("launching headless browser");
    Browser::new(launch_options)
        .map_err(|e| Error::Startup(format!("failed to launch browser: {}", e)))
}
