//! Chromium process launch and DevTools endpoint discovery.
//!
//! Spawns the browser with an ephemeral user-data directory and scrapes
//! the advertised WebSocket endpoint from its stderr.

// ============================================================================
// Imports
// ============================================================================

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use regex::Regex;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::time::timeout;
use tracing::{debug, info, trace};
use url::Url;

use crate::error::{Error, Result};

use super::options::ChromeOptions;

// ============================================================================
// Constants
// ============================================================================

/// Bound on waiting for the browser to advertise its endpoint.
const STARTUP_TIMEOUT: Duration = Duration::from_secs(20);

/// Well-known binary locations, checked in order.
const CHROME_CANDIDATES: &[&str] = &[
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/snap/bin/chromium",
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
];

// ============================================================================
// LaunchedBrowser
// ============================================================================

/// A spawned browser process with its discovered endpoint.
#[derive(Debug)]
pub(crate) struct LaunchedBrowser {
    /// The child process; `kill_on_drop` is set.
    pub child: Child,
    /// Process ID for logging.
    pub pid: u32,
    /// Advertised DevTools WebSocket URL.
    pub ws_url: String,
    /// Ephemeral profile directory, removed on drop.
    pub user_data_dir: TempDir,
}

// ============================================================================
// Launch
// ============================================================================

/// Locates a Chromium binary at a well-known path.
pub(crate) fn find_chrome() -> Result<PathBuf> {
    for candidate in CHROME_CANDIDATES {
        let path = PathBuf::from(candidate);
        if path.exists() {
            debug!(binary = %path.display(), "Chromium binary found");
            return Ok(path);
        }
    }
    Err(Error::chrome_not_found(CHROME_CANDIDATES[0]))
}

/// Spawns the browser and waits for its DevTools endpoint.
pub(crate) async fn launch(options: &ChromeOptions) -> Result<LaunchedBrowser> {
    let binary = match &options.binary {
        Some(binary) => {
            if !binary.exists() {
                return Err(Error::chrome_not_found(binary.clone()));
            }
            binary.clone()
        }
        None => find_chrome()?,
    };

    let user_data_dir = tempfile::Builder::new()
        .prefix("chrome-press-")
        .tempdir()?;
    let args = options.to_args(user_data_dir.path());

    debug!(binary = %binary.display(), ?args, "Launching Chromium");

    let mut child = Command::new(&binary)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| Error::launch(format!("failed to spawn {}: {e}", binary.display())))?;
    let pid = child.id().unwrap_or(0);

    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| Error::launch("child stderr not captured"))?;

    // Dropping `child` on any error path kills the process.
    let ws_url = match timeout(STARTUP_TIMEOUT, discover_endpoint(stderr)).await {
        Ok(Ok(url)) => url,
        Ok(Err(e)) => return Err(e),
        Err(_) => {
            return Err(Error::launch(format!(
                "no DevTools endpoint advertised within {}s",
                STARTUP_TIMEOUT.as_secs()
            )));
        }
    };

    Url::parse(&ws_url)
        .map_err(|e| Error::launch(format!("invalid DevTools URL `{ws_url}`: {e}")))?;

    info!(pid, ws_url = %ws_url, "Chromium ready");

    Ok(LaunchedBrowser {
        child,
        pid,
        ws_url,
        user_data_dir,
    })
}

// ============================================================================
// Endpoint Discovery
// ============================================================================

/// Reads stderr until the endpoint announcement appears.
async fn discover_endpoint(stderr: ChildStderr) -> Result<String> {
    let mut lines = BufReader::new(stderr).lines();

    while let Some(line) = lines.next_line().await? {
        trace!(line = %line, "Chromium stderr");

        if let Some(url) = extract_endpoint(&line) {
            // Keep draining stderr so the child never blocks on a full
            // pipe.
            tokio::spawn(async move { while let Ok(Some(_)) = lines.next_line().await {} });
            return Ok(url);
        }
    }

    Err(Error::launch(
        "browser exited before advertising a DevTools endpoint",
    ))
}

/// Extracts the WebSocket URL from an announcement line.
fn extract_endpoint(line: &str) -> Option<String> {
    let pattern = Regex::new(r"DevTools listening on (ws://\S+)").ok()?;
    pattern
        .captures(line)
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str().to_string())
}

// ============================================================================
// Tests
// ============================================================================
