//! Readiness polling - Wait for a freshly spawned core to answer `/api/info`

use std::time::Duration;

use anyhow::Result;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::process::{EventSender, ProcessEvent};

/// Probes a core's info endpoint at a fixed interval until it answers.
///
/// There is no attempt limit: a poll ends when the endpoint returns JSON or
/// when its cancellation token fires (stop, delete, exit or restart).
#[derive(Debug, Clone)]
pub struct ReadinessPoller {
    client: reqwest::Client,
    interval: Duration,
}

impl ReadinessPoller {
    pub fn new(interval: Duration, probe_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(probe_timeout).build()?;
        Ok(Self { client, interval })
    }

    pub fn info_url(port: u16) -> String {
        format!("http://127.0.0.1:{}/api/info", port)
    }

    /// One probe: any response whose body parses as JSON counts as ready
    pub async fn probe(&self, port: u16) -> Result<()> {
        let response = self.client.get(Self::info_url(port)).send().await?;
        response.json::<serde_json::Value>().await?;
        Ok(())
    }

    /// Probe until ready or cancelled. The first probe fires one interval
    /// after the call, never immediately.
    pub async fn wait_ready(&self, port: u16, cancel: &CancellationToken) -> bool {
        let mut attempt: u64 = 0;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return false,
                _ = sleep(self.interval) => {}
            }
            attempt += 1;

            tokio::select! {
                _ = cancel.cancelled() => return false,
                result = self.probe(port) => match result {
                    Ok(()) => {
                        info!("Core on port {} is ready after {} probe(s)", port, attempt);
                        return true;
                    }
                    Err(e) => debug!("Polling core on port {} ... ({:#})", port, e),
                },
            }
        }
    }

    /// Run a poll in the background, reporting `Ready` for `generation` on success
    pub fn spawn(
        &self,
        name: String,
        generation: u64,
        port: u16,
        cancel: CancellationToken,
        events: EventSender,
    ) -> JoinHandle<()> {
        let poller = self.clone();
        tokio::spawn(async move {
            debug!("Polling instance '{}' on port {}", name, port);
            if poller.wait_ready(port, &cancel).await {
                let _ = events.send((name, ProcessEvent::Ready { generation }));
            } else {
                debug!("Readiness poll for instance '{}' cancelled", name);
            }
        })
    }
}
