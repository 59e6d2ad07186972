use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error, info, warn};
use reqwest::{Client, StatusCode, Url};
use tokio::time::timeout;

use super::models::{BrightnessReport, BrightnessUpdate, ReportError, ReportResult};
use crate::shutdown::{self, ShutdownSignal, ShutdownTrigger};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
pub const STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// Destination for brightness updates.
#[async_trait]
pub trait BrightnessSink: Send + Sync {
    /// Deliver one update. Only an explicit acceptance counts as success.
    async fn update_brightness(&self, is_on: bool) -> ReportResult<()>;
}

/// Posts brightness updates to the remote HTTP endpoint.
pub struct BrightnessClient {
    client: Client,
    full_url: Url,
}

impl BrightnessClient {
    pub fn new(endpoint: &str, device_id: &str, request_timeout: Duration) -> ReportResult<Self> {
        let full_url = Url::parse_with_params(endpoint, &[("deviceId", device_id)])
            .map_err(|e| ReportError::InvalidEndpoint(format!("{}: {}", endpoint, e)))?;
        let client = Client::builder().timeout(request_timeout).build()?;

        Ok(Self { client, full_url })
    }

    pub fn url(&self) -> &Url {
        &self.full_url
    }
}

#[async_trait]
impl BrightnessSink for BrightnessClient {
    async fn update_brightness(&self, is_on: bool) -> ReportResult<()> {
        debug!("POST {} brightness={}", self.full_url, is_on);

        let response = self
            .client
            .post(self.full_url.clone())
            .json(&BrightnessUpdate { brightness: is_on })
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::OK {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(ReportError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

/// Periodically pushes the display's brightness state to a [`BrightnessSink`],
/// sending only values that differ from the last accepted one.
pub struct RemoteStateReporter {
    sink: Arc<dyn BrightnessSink>,
    session: Option<ReporterSession>,
}

struct ReporterSession {
    task_handle: tokio::task::JoinHandle<()>,
    stop: ShutdownTrigger,
}

impl RemoteStateReporter {
    pub fn new(sink: Arc<dyn BrightnessSink>) -> Self {
        Self { sink, session: None }
    }

    pub fn is_running(&self) -> bool {
        self.session.is_some()
    }

    /// Poll `get_state` every `interval` and report changes.
    pub fn start<F>(&mut self, get_state: F, interval: Duration)
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        if self.session.is_some() {
            warn!("Remote state reporter already running");
            return;
        }

        let (stop, signal) = shutdown::channel();
        let task_handle = tokio::spawn(update_loop(self.sink.clone(), get_state, interval, signal));
        self.session = Some(ReporterSession { task_handle, stop });
        info!("Started periodic brightness updates (every {:?})", interval);
    }

    /// Stop the loop, waiting up to [`STOP_TIMEOUT`] for it to exit.
    pub async fn stop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };

        session.stop.trigger();
        let mut task_handle = session.task_handle;
        if timeout(STOP_TIMEOUT, &mut task_handle).await.is_err() {
            warn!("Reporter did not stop in time, aborting");
            task_handle.abort();
        }
        info!("Stopped periodic brightness updates");
    }
}

async fn update_loop<F>(
    sink: Arc<dyn BrightnessSink>,
    get_state: F,
    interval: Duration,
    mut stop: ShutdownSignal,
)
where
    F: Fn() -> bool + Send + Sync + 'static,
{
    let mut report = BrightnessReport::default();

    loop {
        if stop.is_triggered() {
            break;
        }

        let current = get_state();
        if report.needs_report(current) {
            info!("Sending brightness update: brightness={}", current);
            let result = tokio::select! {
                _ = stop.triggered() => break,
                result = sink.update_brightness(current) => result,
            };
            match result {
                Ok(()) => {
                    report.record_success(current);
                    info!("Brightness update accepted: brightness={}", current);
                }
                Err(e) => error!("Brightness update failed: {}", e),
            }
        }

        if stop.sleep(interval).await {
            break;
        }
    }
}
