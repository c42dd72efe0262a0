//! Step lists for the built-in rendering operations.
//!
//! These are pure templates over the engine's primitives; the browser's
//! public wrappers seed the initial params they read:
//!
//! | State key | Seeded by | Consumed by |
//! |-----------|-----------|-------------|
//! | `url` | caller | [`navigate`] |
//! | `printOptions` | [`PdfOptions`] | [`print_to_pdf`] |
//! | `screenshotOptions` | [`ScreenshotOptions`] | [`capture_screenshot`] |
//!
//! [`PdfOptions`]: crate::browser::PdfOptions
//! [`ScreenshotOptions`]: crate::browser::ScreenshotOptions

// ============================================================================
// Imports
// ============================================================================

use serde_json::{Value, json};

use crate::engine::{Extract, Step, StepList};

// ============================================================================
// Operations
// ============================================================================

/// Navigates to the `url` in state and waits for the frame to finish
/// loading.
///
/// Shared by every rendering operation via `include`. Leaves `frameId` in
/// the execution state.
#[must_use]
pub fn navigate() -> StepList {
    StepList::new(vec![
        Step::call("Page.navigate", |state| {
            json!({"url": state.get("url").cloned().unwrap_or(Value::Null)})
        }),
        Step::await_response(vec![Extract::key("frameId")]),
        Step::await_event_matching(
            "Page.frameStoppedLoading",
            |event, state| Some(&event.params["frameId"]) == state.get("frameId"),
            vec![],
        ),
    ])
}

/// Renders the navigated page to PDF.
///
/// Print parameters are read from `printOptions` in state; the output is
/// the base64-encoded PDF data.
#[must_use]
pub fn print_to_pdf() -> StepList {
    StepList::new(vec![
        Step::include(navigate()),
        Step::call("Page.printToPDF", |state| {
            state
                .get("printOptions")
                .cloned()
                .unwrap_or_else(|| json!({}))
        }),
        Step::await_response(vec![Extract::key("data")]),
        Step::output("data"),
    ])
}

/// Captures a screenshot of the navigated page.
///
/// Capture parameters are read from `screenshotOptions` in state; the
/// output is the base64-encoded image data.
#[must_use]
pub fn capture_screenshot() -> StepList {
    StepList::new(vec![
        Step::include(navigate()),
        Step::call("Page.captureScreenshot", |state| {
            state
                .get("screenshotOptions")
                .cloned()
                .unwrap_or_else(|| json!({}))
        }),
        Step::await_response(vec![Extract::key("data")]),
        Step::output("data"),
    ])
}

// ============================================================================
// Tests
// ============================================================================
