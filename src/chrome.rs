//! Chrome DevTools Protocol backend for the supervisor seams.
//!
//! Launches headless Chrome via the `headless_chrome` crate with a minimal
//! footprint suitable for constrained-memory hosts, and captures product
//! frames from generated HTML. Each capture runs in its own tab, which is
//! closed on every exit path.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as Base64Engine;
use headless_chrome::protocol::cdp::Page;
use headless_chrome::protocol::cdp::Target::CreateTarget;
use headless_chrome::{Browser, LaunchOptions};
use log::debug;

use crate::error::{Error, Result};
use crate::supervisor::{BrowserDriver, BrowserHandle, CaptureJob};

/// Launch arguments for constrained-memory hosts: no sandbox helpers, no
/// shared-memory usage, no zygote or GPU processes.
const CHROME_ARGS: &[&str] = &[
    "--disable-setuid-sandbox",
    "--disable-dev-shm-usage",
    "--no-zygote",
    "--disable-gpu",
];

/// Keep the browser alive between renders; the supervisor owns its
/// lifetime, not an idle timer.
const IDLE_TIMEOUT: Duration = Duration::from_secs(86_400);

/// Default window size; individual captures get their own sized contexts.
const WINDOW_SIZE: (u32, u32) = (1080, 1080);

/// Driver seam for headless Chrome. `headless_chrome` folds driver and
/// process launch into one call, so the driver itself carries no state and
/// stopping it has nothing left to do once the browser handle is dropped.
#[derive(Default)]
pub struct ChromeDriver;

impl BrowserDriver for ChromeDriver {
    type Browser = ChromeBrowser;

    fn launch(&mut self) -> Result<ChromeBrowser> {
        let args: Vec<&std::ffi::OsStr> = CHROME_ARGS.iter().map(|a| a.as_ref()).collect();
        let options = LaunchOptions::default_builder()
            .headless(true)
            .sandbox(false)
            .window_size(Some(WINDOW_SIZE))
            .idle_browser_timeout(IDLE_TIMEOUT)
            .args(args)
            .build()
            .map_err(|e| Error::Launch(format!("Failed to build launch options: {}", e)))?;

        let browser = Browser::new(options)
            .map_err(|e| Error::Launch(format!("Failed to launch browser: {}", e)))?;

        Ok(ChromeBrowser { inner: browser })
    }

    fn stop(&mut self) {}
}

/// Handle on a launched Chrome process. Clones share the same process; the
/// process terminates when the supervisor drops its stored handle.
#[derive(Clone)]
pub struct ChromeBrowser {
    inner: Browser,
}

impl BrowserHandle for ChromeBrowser {
    fn is_connected(&self) -> bool {
        self.inner.get_version().is_ok()
    }

    fn capture(&self, job: &CaptureJob) -> Result<Vec<u8>> {
        let tab = self
            .inner
            .new_tab_with_options(CreateTarget {
                url: "about:blank".to_string(),
                left: None,
                top: None,
                width: Some(job.width),
                height: Some(job.height),
                window_state: None,
                browser_context_id: None,
                enable_begin_frame_control: None,
                new_window: None,
                background: None,
                for_tab: None,
                hidden: None,
            })
            .map_err(Error::from_browser)?;

        let result = capture_on_tab(tab.as_ref(), job);

        if let Err(e) = tab.close(true) {
            debug!("tab close after capture failed: {}", e);
        }

        result
    }

    fn close(&self) {
        // No explicit kill in the CDP crate; the process exits when the
        // supervisor's stored handle (the last long-lived clone) drops.
    }
}

fn capture_on_tab(tab: &headless_chrome::Tab, job: &CaptureJob) -> Result<Vec<u8>> {
    let content_url = format!("data:text/html;base64,{}", STANDARD.encode(job.html.as_bytes()));

    tab.navigate_to(&content_url).map_err(Error::from_browser)?;
    // Initial parse only; embedded images are inlined, so waiting for
    // network idle would be both unnecessary and unreliable.
    tab.wait_until_navigated().map_err(Error::from_browser)?;

    std::thread::sleep(job.settle);

    let frame = tab
        .wait_for_element_with_custom_timeout(&job.frame_selector, job.frame_timeout)
        .map_err(Error::from_browser)?;

    frame
        .capture_screenshot(Page::CaptureScreenshotFormatOption::Png)
        .map_err(Error::from_browser)
}
