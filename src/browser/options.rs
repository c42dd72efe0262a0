//! Launch and rendering options.
//!
//! Provides type-safe configuration for the Chromium process and for the
//! built-in rendering operations.
//!
//! # Example
//!
//! ```ignore
//! use chrome_press::{ChromeOptions, PdfOptions};
//!
//! let chrome = ChromeOptions::new()
//!     .with_no_sandbox()
//!     .with_window_size(1280, 800);
//!
//! let pdf = PdfOptions::new()
//!     .with_landscape()
//!     .with_print_background()
//!     .with_margins(0.4, 0.4, 0.4, 0.4);
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as Base64Standard;
use serde_json::{Map, Value, json};

use crate::session::PoolOptions;

// ============================================================================
// Constants
// ============================================================================

/// Default bound on individual protocol calls.
const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// ChromeOptions
// ============================================================================

/// Chromium process configuration.
///
/// Controls how the browser is launched and how the session pool over it
/// is sized.
#[derive(Debug, Clone)]
pub struct ChromeOptions {
    /// Path to the Chromium binary; discovered from well-known locations
    /// when unset.
    pub binary: Option<PathBuf>,

    /// Run without a GUI. Rendering requires no display either way;
    /// disable only for debugging.
    pub headless: bool,

    /// Disable the sandbox (required in some container environments).
    pub no_sandbox: bool,

    /// Window dimensions in pixels (width, height).
    pub window_size: Option<(u32, u32)>,

    /// Additional custom command-line arguments.
    pub extra_args: Vec<String>,

    /// Bound on individual protocol calls and event waits.
    pub call_timeout: Duration,

    /// Session pool configuration.
    pub pool: PoolOptions,
}

impl Default for ChromeOptions {
    fn default() -> Self {
        Self {
            binary: None,
            headless: true,
            no_sandbox: false,
            window_size: None,
            extra_args: Vec::new(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
            pool: PoolOptions::default(),
        }
    }
}

impl ChromeOptions {
    /// Creates options with default settings.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the browser binary path.
    #[inline]
    #[must_use]
    pub fn with_binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.binary = Some(path.into());
        self
    }

    /// Disables headless mode.
    #[inline]
    #[must_use]
    pub fn with_headful(mut self) -> Self {
        self.headless = false;
        self
    }

    /// Disables the sandbox.
    #[inline]
    #[must_use]
    pub fn with_no_sandbox(mut self) -> Self {
        self.no_sandbox = true;
        self
    }

    /// Sets window size in pixels.
    #[inline]
    #[must_use]
    pub fn with_window_size(mut self, width: u32, height: u32) -> Self {
        self.window_size = Some((width, height));
        self
    }

    /// Appends a custom command-line argument.
    #[inline]
    #[must_use]
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.extra_args.push(arg.into());
        self
    }

    /// Sets the protocol call timeout.
    #[inline]
    #[must_use]
    pub fn with_call_timeout(mut self, bound: Duration) -> Self {
        self.call_timeout = bound;
        self
    }

    /// Sets the session pool configuration.
    #[inline]
    #[must_use]
    pub fn with_pool(mut self, pool: PoolOptions) -> Self {
        self.pool = pool;
        self
    }

    /// Builds the command-line argument list.
    #[must_use]
    pub fn to_args(&self, user_data_dir: &Path) -> Vec<String> {
        let mut args = Vec::new();

        if self.headless {
            args.push("--headless=new".to_string());
        }
        if self.no_sandbox {
            args.push("--no-sandbox".to_string());
        }
        if let Some((width, height)) = self.window_size {
            args.push(format!("--window-size={width},{height}"));
        }

        args.extend(
            [
                "--disable-gpu",
                "--no-first-run",
                "--no-default-browser-check",
                "--hide-scrollbars",
                "--mute-audio",
                "--disable-dev-shm-usage",
                "--remote-debugging-port=0",
            ]
            .map(String::from),
        );

        args.push(format!("--user-data-dir={}", user_data_dir.display()));
        args.extend(self.extra_args.iter().cloned());

        args
    }
}

// ============================================================================
// Source
// ============================================================================

/// What to render: a remote URL or inline HTML.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// Navigate to a URL.
    Url(String),
    /// Render an HTML document directly.
    Html(String),
}

impl Source {
    /// Creates a URL source.
    #[inline]
    #[must_use]
    pub fn url(url: impl Into<String>) -> Self {
        Self::Url(url.into())
    }

    /// Creates an inline HTML source.
    #[inline]
    #[must_use]
    pub fn html(html: impl Into<String>) -> Self {
        Self::Html(html.into())
    }

    /// Returns the navigable URL for this source.
    ///
    /// Inline HTML is carried as a base64 `data:` URL so both variants go
    /// through the same navigation steps.
    #[must_use]
    pub fn to_url(&self) -> String {
        match self {
            Self::Url(url) => url.clone(),
            Self::Html(html) => format!(
                "data:text/html;base64,{}",
                Base64Standard.encode(html.as_bytes())
            ),
        }
    }
}

impl From<&str> for Source {
    fn from(url: &str) -> Self {
        Self::Url(url.to_string())
    }
}

impl From<String> for Source {
    fn from(url: String) -> Self {
        Self::Url(url)
    }
}

// ============================================================================
// PdfOptions
// ============================================================================

/// Parameters for `Page.printToPDF`.
///
/// Unset fields fall back to the browser's defaults (portrait US Letter,
/// 1cm margins). Dimensions are in inches.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PdfOptions {
    /// Landscape orientation.
    pub landscape: bool,

    /// Print background graphics.
    pub print_background: bool,

    /// Render the header and footer templates.
    pub display_header_footer: bool,

    /// Scale factor (browser default 1.0).
    pub scale: Option<f64>,

    /// Paper width in inches.
    pub paper_width: Option<f64>,

    /// Paper height in inches.
    pub paper_height: Option<f64>,

    /// Margins in inches: top, bottom, left, right.
    pub margins: Option<(f64, f64, f64, f64)>,

    /// Page ranges, e.g. `"1-5, 8"`.
    pub page_ranges: Option<String>,

    /// HTML template for the page header.
    pub header_template: Option<String>,

    /// HTML template for the page footer.
    pub footer_template: Option<String>,

    /// Prefer page size defined by CSS over paper width/height.
    pub prefer_css_page_size: bool,
}

impl PdfOptions {
    /// Creates options with browser defaults.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables landscape orientation.
    #[inline]
    #[must_use]
    pub fn with_landscape(mut self) -> Self {
        self.landscape = true;
        self
    }

    /// Enables background graphics.
    #[inline]
    #[must_use]
    pub fn with_print_background(mut self) -> Self {
        self.print_background = true;
        self
    }

    /// Sets the scale factor.
    #[inline]
    #[must_use]
    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = Some(scale);
        self
    }

    /// Sets the paper size in inches.
    #[inline]
    #[must_use]
    pub fn with_paper_size(mut self, width: f64, height: f64) -> Self {
        self.paper_width = Some(width);
        self.paper_height = Some(height);
        self
    }

    /// Sets all four margins in inches: top, bottom, left, right.
    #[inline]
    #[must_use]
    pub fn with_margins(mut self, top: f64, bottom: f64, left: f64, right: f64) -> Self {
        self.margins = Some((top, bottom, left, right));
        self
    }

    /// Restricts printing to the given page ranges.
    #[inline]
    #[must_use]
    pub fn with_page_ranges(mut self, ranges: impl Into<String>) -> Self {
        self.page_ranges = Some(ranges.into());
        self
    }

    /// Sets header and footer templates and enables their display.
    #[inline]
    #[must_use]
    pub fn with_header_footer(
        mut self,
        header: impl Into<String>,
        footer: impl Into<String>,
    ) -> Self {
        self.header_template = Some(header.into());
        self.footer_template = Some(footer.into());
        self.display_header_footer = true;
        self
    }

    /// Prefers the CSS-defined page size.
    #[inline]
    #[must_use]
    pub fn with_prefer_css_page_size(mut self) -> Self {
        self.prefer_css_page_size = true;
        self
    }

    /// Builds the protocol params object.
    #[must_use]
    pub fn to_params(&self) -> Value {
        let mut params = Map::new();

        if self.landscape {
            params.insert("landscape".into(), json!(true));
        }
        if self.print_background {
            params.insert("printBackground".into(), json!(true));
        }
        if self.display_header_footer {
            params.insert("displayHeaderFooter".into(), json!(true));
        }
        if self.prefer_css_page_size {
            params.insert("preferCSSPageSize".into(), json!(true));
        }
        if let Some(scale) = self.scale {
            params.insert("scale".into(), json!(scale));
        }
        if let Some(width) = self.paper_width {
            params.insert("paperWidth".into(), json!(width));
        }
        if let Some(height) = self.paper_height {
            params.insert("paperHeight".into(), json!(height));
        }
        if let Some((top, bottom, left, right)) = self.margins {
            params.insert("marginTop".into(), json!(top));
            params.insert("marginBottom".into(), json!(bottom));
            params.insert("marginLeft".into(), json!(left));
            params.insert("marginRight".into(), json!(right));
        }
        if let Some(ranges) = &self.page_ranges {
            params.insert("pageRanges".into(), json!(ranges));
        }
        if let Some(header) = &self.header_template {
            params.insert("headerTemplate".into(), json!(header));
        }
        if let Some(footer) = &self.footer_template {
            params.insert("footerTemplate".into(), json!(footer));
        }

        Value::Object(params)
    }
}

// ============================================================================
// ImageFormat
// ============================================================================

/// Image format for screenshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageFormat {
    /// PNG format (lossless, larger file size).
    #[default]
    Png,
    /// JPEG format with quality (0-100).
    Jpeg(u8),
}

impl ImageFormat {
    /// Returns the format string for the protocol.
    #[must_use]
    pub fn format_str(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg(_) => "jpeg",
        }
    }

    /// Returns the quality value if JPEG.
    #[must_use]
    pub fn quality(&self) -> Option<u8> {
        match self {
            Self::Png => None,
            Self::Jpeg(quality) => Some((*quality).min(100)),
        }
    }
}

// ============================================================================
// ScreenshotOptions
// ============================================================================

/// Parameters for `Page.captureScreenshot`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScreenshotOptions {
    /// Image format.
    pub format: ImageFormat,

    /// Capture the full scrollable page, not just the viewport.
    pub full_page: bool,
}

impl ScreenshotOptions {
    /// Creates options with defaults (viewport PNG).
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets JPEG format with quality (0-100).
    #[inline]
    #[must_use]
    pub fn with_jpeg(mut self, quality: u8) -> Self {
        self.format = ImageFormat::Jpeg(quality.min(100));
        self
    }

    /// Enables full-page capture.
    #[inline]
    #[must_use]
    pub fn with_full_page(mut self) -> Self {
        self.full_page = true;
        self
    }

    /// Builds the protocol params object.
    #[must_use]
    pub fn to_params(&self) -> Value {
        let mut params = Map::new();
        params.insert("format".into(), json!(self.format.format_str()));

        if let Some(quality) = self.format.quality() {
            params.insert("quality".into(), json!(quality));
        }
        if self.full_page {
            params.insert("captureBeyondViewport".into(), json!(true));
        }

        Value::Object(params)
    }
}

// ============================================================================
// Tests
// ============================================================================
