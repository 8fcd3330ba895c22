//! Browser process supervisor.
//!
//! Owns the single long-lived browser process behind two seams: a
//! [`BrowserDriver`] that can launch browsers and be stopped, and the
//! [`BrowserHandle`]s it produces. The production implementation lives in
//! [`crate::chrome`]; tests substitute fakes to exercise the relaunch and
//! restart policies without a real Chrome.
//!
//! The supervisor is the only owner of the driver/browser pair. All state
//! transitions happen under one mutex, so concurrent `ensure_live` calls
//! cannot race to launch two processes: one launch wins, the rest observe
//! the resulting live handle. The lock is never held across a render; only
//! across the liveness check and relaunch decision.

use std::sync::Mutex;
use std::time::Duration;

use log::{info, warn};

use crate::error::Result;

/// One render job for the browser: final HTML plus capture parameters.
#[derive(Debug, Clone)]
pub struct CaptureJob {
    pub html: String,
    pub width: u32,
    pub height: u32,
    /// Fixed delay after load for font shaping / layout to stabilize.
    pub settle: Duration,
    /// CSS selector of the frame region to capture.
    pub frame_selector: String,
    /// How long to wait for the frame region to become visible.
    pub frame_timeout: Duration,
}

impl Default for CaptureJob {
    fn default() -> Self {
        Self {
            html: String::new(),
            width: 1080,
            height: 1080,
            settle: Duration::from_millis(300),
            frame_selector: ".frame".to_string(),
            frame_timeout: Duration::from_secs(5),
        }
    }
}

/// A handle on a launched browser process. Handles are cheap clones of a
/// shared reference; the process itself stays owned by the supervisor.
pub trait BrowserHandle: Clone + Send + Sync + 'static {
    /// Whether the process is still reachable.
    fn is_connected(&self) -> bool;

    /// Open an isolated context, render the job and return PNG bytes.
    /// Blocking; callers run it on a blocking-capable thread.
    fn capture(&self, job: &CaptureJob) -> Result<Vec<u8>>;

    /// Close the browser, best-effort.
    fn close(&self);
}

/// The engine underneath the browser: launches browser processes, stops.
pub trait BrowserDriver: Send + 'static {
    type Browser: BrowserHandle;

    /// Launch one browser process.
    fn launch(&mut self) -> Result<Self::Browser>;

    /// Stop the driver, best-effort.
    fn stop(&mut self);
}

struct SupervisorState<D: BrowserDriver> {
    driver: Option<D>,
    browser: Option<D::Browser>,
}

type DriverFactory<D> = Box<dyn Fn() -> Result<D> + Send + Sync>;

/// Supervises exactly one browser process: absent, live, or dead pending
/// relaunch. A full restart discards the driver and builds a fresh one
/// through the factory.
pub struct Supervisor<D: BrowserDriver> {
    make_driver: DriverFactory<D>,
    state: Mutex<SupervisorState<D>>,
}

impl<D: BrowserDriver> Supervisor<D> {
    pub fn new<F>(make_driver: F) -> Self
    where
        F: Fn() -> Result<D> + Send + Sync + 'static,
    {
        Self {
            make_driver: Box::new(make_driver),
            state: Mutex::new(SupervisorState { driver: None, browser: None }),
        }
    }

    /// Return a handle on a live browser, starting or relaunching whatever
    /// is missing. A dead handle is closed (best-effort) before relaunch.
    /// A fatal launch failure escalates to a full driver restart.
    pub fn ensure_live(&self) -> Result<D::Browser> {
        let mut state = self.lock();

        if state.driver.is_none() {
            state.driver = Some((self.make_driver)()?);
        }

        let relaunch = match &state.browser {
            None => true,
            Some(b) => !b.is_connected(),
        };

        if relaunch {
            if let Some(stale) = state.browser.take() {
                warn!("browser disconnected; relaunching");
                stale.close();
            }
            let driver = state.driver.as_mut().expect("driver present after start");
            match driver.launch() {
                Ok(browser) => {
                    info!("browser launched");
                    state.browser = Some(browser);
                }
                Err(e) if e.is_fatal() => {
                    warn!("driver broken during launch ({}); performing full restart", e);
                    self.full_restart(&mut state)?;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(state.browser.as_ref().expect("browser present after launch").clone())
    }

    /// Tear down the browser and the driver, then bring both back up. Used
    /// after a fatal mid-render failure.
    pub fn restart(&self) -> Result<()> {
        let mut state = self.lock();
        info!("full browser restart requested");
        self.full_restart(&mut state)
    }

    fn full_restart(&self, state: &mut SupervisorState<D>) -> Result<()> {
        if let Some(browser) = state.browser.take() {
            browser.close();
        }
        if let Some(mut driver) = state.driver.take() {
            driver.stop();
        }
        let mut driver = (self.make_driver)()?;
        let browser = driver.launch()?;
        state.driver = Some(driver);
        state.browser = Some(browser);
        Ok(())
    }

    /// Close the browser and stop the driver, best-effort; resets to Absent.
    pub fn shutdown(&self) {
        let mut state = self.lock();
        if let Some(browser) = state.browser.take() {
            browser.close();
        }
        if let Some(mut driver) = state.driver.take() {
            driver.stop();
        }
        info!("browser supervisor shut down");
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SupervisorState<D>> {
        // A poisoned lock means a launch panicked; the state itself is
        // still a coherent pair of options, so recover it.
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
