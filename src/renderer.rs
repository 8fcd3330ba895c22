//! Frame renderer: gate, supervisor and retry policy in one place.
//!
//! A render acquires a gate slot, makes sure the supervised browser is
//! alive, and captures the frame on a blocking thread. Ordinary failures
//! (frame never visible, bad template) surface to the caller once. A fatal
//! failure (the browser died mid-render) triggers exactly one full
//! supervisor restart and one retry; whatever the retry returns is final.

use std::sync::Arc;

use log::warn;

use crate::error::{Error, Result};
use crate::gate::RenderGate;
use crate::supervisor::{BrowserDriver, BrowserHandle, CaptureJob, Supervisor};

pub struct FrameRenderer<D: BrowserDriver> {
    supervisor: Arc<Supervisor<D>>,
    gate: RenderGate,
}

impl<D: BrowserDriver> FrameRenderer<D> {
    pub fn new(supervisor: Arc<Supervisor<D>>, concurrency: usize) -> Self {
        Self { supervisor, gate: RenderGate::new(concurrency) }
    }

    /// Render final HTML into PNG bytes. Blocks (asynchronously) on the
    /// gate when the browser is already at capacity.
    pub async fn render(&self, html: String, width: u32, height: u32) -> Result<Vec<u8>> {
        let job = CaptureJob { html, width, height, ..CaptureJob::default() };

        let _slot = self.gate.acquire().await;

        match self.attempt(job.clone()).await {
            Err(e) if e.is_fatal() => {
                warn!("browser lost mid-render ({}); restarting and retrying once", e);
                self.restart().await?;
                self.attempt(job).await
            }
            other => other,
        }
    }

    async fn attempt(&self, job: CaptureJob) -> Result<Vec<u8>> {
        let supervisor = Arc::clone(&self.supervisor);
        tokio::task::spawn_blocking(move || {
            let browser = supervisor.ensure_live()?;
            browser.capture(&job)
        })
        .await
        .map_err(|e| Error::Render(format!("render task failed: {}", e)))?
    }

    async fn restart(&self) -> Result<()> {
        let supervisor = Arc::clone(&self.supervisor);
        tokio::task::spawn_blocking(move || supervisor.restart())
            .await
            .map_err(|e| Error::Render(format!("restart task failed: {}", e)))?
    }

    /// Close the browser and stop the driver at service teardown.
    pub async fn shutdown(&self) {
        let supervisor = Arc::clone(&self.supervisor);
        let _ = tokio::task::spawn_blocking(move || supervisor.shutdown()).await;
    }
}
