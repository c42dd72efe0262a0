//! Browser root: process supervision and the rendering entry points.
//!
//! A [`Browser`] owns one Chromium process (or an attachment to a running
//! one), the channel over its DevTools connection, and the session pool.
//! It exposes the single core operation — run a step list against a
//! pooled session — plus friendly wrappers for the built-in operations.
//!
//! # Example
//!
//! ```no_run
//! use chrome_press::{Browser, ChromeOptions, PdfOptions, Source};
//!
//! # async fn example() -> chrome_press::Result<()> {
//! let browser = Browser::launch(ChromeOptions::new()).await?;
//!
//! let pdf = browser
//!     .print_to_pdf(Source::url("https://example.com"), PdfOptions::new())
//!     .await?;
//! std::fs::write("example.pdf", pdf)?;
//!
//! browser.close();
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as Base64Standard;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::process::Child;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::engine::{self, StepList};
use crate::error::{Error, Result};
use crate::ops;
use crate::session::{PoolOptions, SessionPool};
use crate::transport::{Channel, WebSocketTransport};

// ============================================================================
// Submodules
// ============================================================================

/// Launch and rendering options.
pub mod options;

mod launcher;

pub use options::{ChromeOptions, ImageFormat, PdfOptions, ScreenshotOptions, Source};

// ============================================================================
// ProcessHandle
// ============================================================================

/// Kill-switch for a supervised browser process.
///
/// Dropping the handle signals the supervisor to kill the child.
struct ProcessHandle {
    /// Signal into the supervisor task.
    kill_tx: Option<oneshot::Sender<()>>,
    /// Process ID for logging.
    pid: u32,
}

impl ProcessHandle {
    /// Signals the supervisor to terminate the process.
    fn stop(&mut self) {
        if let Some(kill_tx) = self.kill_tx.take() {
            debug!(pid = self.pid, "Stopping browser process");
            let _ = kill_tx.send(());
        }
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

// ============================================================================
// Types
// ============================================================================

/// Shared browser internals.
struct BrowserInner {
    /// Channel over the DevTools connection.
    channel: Channel,
    /// Pool of page sessions.
    pool: SessionPool,
    /// Supervised process; `None` when attached to an external browser.
    process: Mutex<Option<ProcessHandle>>,
    /// Ephemeral profile directory, kept for the process lifetime.
    #[allow(dead_code)]
    user_data_dir: Option<TempDir>,
}

// ============================================================================
// Browser
// ============================================================================

/// Handle to a supervised headless browser.
///
/// Cheap to clone; all clones share the process, channel, and pool.
#[derive(Clone)]
pub struct Browser {
    inner: Arc<BrowserInner>,
}

impl Browser {
    /// Launches and connects to a new browser process.
    ///
    /// # Errors
    ///
    /// - [`Error::ChromeNotFound`] / [`Error::Launch`] if the process
    ///   cannot be started
    /// - [`Error::Connection`] if the DevTools connection fails
    pub async fn launch(options: ChromeOptions) -> Result<Self> {
        let launched = launcher::launch(&options).await?;

        let transport = WebSocketTransport::connect(&launched.ws_url).await?;
        let channel =
            Channel::with_call_timeout(Box::new(transport), options.call_timeout);
        let pool = SessionPool::new(channel.clone(), options.pool.clone());

        let (kill_tx, kill_rx) = oneshot::channel();
        tokio::spawn(supervise(
            launched.child,
            kill_rx,
            pool.clone(),
            channel.clone(),
        ));

        info!(pid = launched.pid, pool_size = options.pool.size, "Browser launched");

        Ok(Self {
            inner: Arc::new(BrowserInner {
                channel,
                pool,
                process: Mutex::new(Some(ProcessHandle {
                    kill_tx: Some(kill_tx),
                    pid: launched.pid,
                })),
                user_data_dir: Some(launched.user_data_dir),
            }),
        })
    }

    /// Attaches to an already-running browser's DevTools endpoint.
    ///
    /// The process is not supervised; only the connection and pool are
    /// owned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if the connection fails.
    pub async fn connect(ws_url: &str, pool_options: PoolOptions) -> Result<Self> {
        let transport = WebSocketTransport::connect(ws_url).await?;
        let channel = Channel::new(Box::new(transport));
        let pool = SessionPool::new(channel.clone(), pool_options);

        info!(ws_url = %ws_url, "Attached to running browser");

        Ok(Self {
            inner: Arc::new(BrowserInner {
                channel,
                pool,
                process: Mutex::new(None),
                user_data_dir: None,
            }),
        })
    }

    /// Builds a browser over an existing channel; tests drive this with
    /// the fake transport.
    #[cfg(test)]
    pub(crate) fn over_channel(channel: Channel, pool_options: PoolOptions) -> Self {
        let pool = SessionPool::new(channel.clone(), pool_options);
        Self {
            inner: Arc::new(BrowserInner {
                channel,
                pool,
                process: Mutex::new(None),
                user_data_dir: None,
            }),
        }
    }

    /// Returns the session pool.
    #[inline]
    #[must_use]
    pub fn pool(&self) -> &SessionPool {
        &self.inner.pool
    }

    /// Returns the command channel.
    #[inline]
    #[must_use]
    pub fn channel(&self) -> &Channel {
        &self.inner.channel
    }

    /// Shuts the browser down: discards sessions, closes the channel,
    /// and terminates the supervised process.
    pub fn close(&self) {
        self.inner.pool.invalidate_all();
        if let Some(mut process) = self.inner.process.lock().take() {
            process.stop();
        }
        self.inner.channel.shutdown();
    }
}

// ============================================================================
// Browser - Operations
// ============================================================================

impl Browser {
    /// Runs a step list against a pooled session.
    ///
    /// Checks a session out, executes the steps, and checks it back in —
    /// crashed sessions are discarded by the checkin. This is the core
    /// operation; everything else is a wrapper over it.
    ///
    /// # Errors
    ///
    /// Propagates checkout and step-execution errors.
    pub async fn run(&self, list: &StepList, initial: Value) -> Result<Value> {
        let session = self.inner.pool.checkout().await?;
        let result = engine::execute(list, &session, initial).await;
        self.inner.pool.checkin(session);
        result
    }

    /// Renders a page to PDF.
    ///
    /// # Errors
    ///
    /// Propagates rendering errors; returns [`Error::Protocol`] if the
    /// browser produced no PDF data.
    pub async fn print_to_pdf(&self, source: Source, options: PdfOptions) -> Result<Vec<u8>> {
        let initial = json!({
            "url": source.to_url(),
            "printOptions": options.to_params(),
        });

        let output = self.run(&ops::print_to_pdf(), initial).await?;
        decode_payload(&output, "Page.printToPDF")
    }

    /// Renders a page to PDF and writes it to a file.
    ///
    /// # Errors
    ///
    /// Propagates rendering and IO errors.
    pub async fn print_to_pdf_file(
        &self,
        source: Source,
        options: PdfOptions,
        path: impl AsRef<Path>,
    ) -> Result<()> {
        let pdf = self.print_to_pdf(source, options).await?;
        tokio::fs::write(path.as_ref(), pdf).await?;
        Ok(())
    }

    /// Captures a screenshot of a page.
    ///
    /// # Errors
    ///
    /// Propagates rendering errors; returns [`Error::Protocol`] if the
    /// browser produced no image data.
    pub async fn capture_screenshot(
        &self,
        source: Source,
        options: ScreenshotOptions,
    ) -> Result<Vec<u8>> {
        let initial = json!({
            "url": source.to_url(),
            "screenshotOptions": options.to_params(),
        });

        let output = self.run(&ops::capture_screenshot(), initial).await?;
        decode_payload(&output, "Page.captureScreenshot")
    }
}

// ============================================================================
// Browser - Display
// ============================================================================

impl fmt::Debug for Browser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Browser")
            .field("live_sessions", &self.inner.pool.live_count())
            .field("channel_closed", &self.inner.channel.is_closed())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Supervision
// ============================================================================

/// Watches the child process; an unexpected exit is a pool-wide crash.
async fn supervise(
    mut child: Child,
    kill_rx: oneshot::Receiver<()>,
    pool: SessionPool,
    channel: Channel,
) {
    tokio::select! {
        status = child.wait() => {
            match status {
                Ok(status) => warn!(%status, "Browser process exited unexpectedly"),
                Err(e) => warn!(error = %e, "Browser process wait failed"),
            }
            pool.invalidate_all();
            channel.shutdown();
        }

        _ = kill_rx => {
            if let Err(e) = child.start_kill() {
                debug!(error = %e, "Kill signal failed");
            }
            match child.wait().await {
                Ok(status) => info!(%status, "Browser process terminated"),
                Err(e) => debug!(error = %e, "Browser process reap failed"),
            }
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Decodes a base64 operation output into bytes.
fn decode_payload(output: &Value, operation: &str) -> Result<Vec<u8>> {
    let data = output
        .as_str()
        .ok_or_else(|| Error::protocol(format!("{operation} returned no data")))?;

    Base64Standard
        .decode(data)
        .map_err(|e| Error::protocol(format!("{operation} returned invalid base64: {e}")))
}

// ============================================================================
// Tests
// ============================================================================
