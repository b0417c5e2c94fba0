//! Ingestion status poller
//!
//! Re-fetches a knowledge base's ingestion operations on a fixed interval while any
//! of them is still pending or in progress. Once none remain it emits a final
//! refresh event and stops. The task is owned by a [`PollerHandle`]; stopping or
//! dropping the handle cancels it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::admin_api::AdminApi;
use crate::domain::knowledge_base::{any_active, IngestionOperation};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);

/// Events sent to the owner of a running poller
#[derive(Debug, Clone, PartialEq)]
pub enum PollEvent {
    /// Some operations are still running
    Progress(Vec<IngestionOperation>),
    /// Nothing is running any more, the view should reload
    Refresh(Vec<IngestionOperation>),
}

pub struct IngestionPoller<A: AdminApi + ?Sized> {
    api: Arc<A>,
    knowledge_base_id: String,
    interval: Duration,
}

impl<A: AdminApi + ?Sized + 'static> IngestionPoller<A> {
    pub fn new(api: Arc<A>, knowledge_base_id: impl Into<String>) -> Self {
        Self {
            api,
            knowledge_base_id: knowledge_base_id.into(),
            interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        if !interval.is_zero() {
            self.interval = interval;
        }
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Spawn the polling task. The first poll happens immediately.
    pub fn start(self) -> (PollerHandle, mpsc::UnboundedReceiver<PollEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();
        let task = tokio::spawn(self.run(token.clone(), tx));

        (
            PollerHandle {
                token,
                task: Some(task),
            },
            rx,
        )
    }

    async fn run(self, token: CancellationToken, tx: mpsc::UnboundedSender<PollEvent>) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        debug!(
            knowledge_base_id = %self.knowledge_base_id,
            interval_ms = self.interval.as_millis() as u64,
            "Ingestion poller started"
        );

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let result = tokio::select! {
                _ = token.cancelled() => break,
                result = self.api.list_ingestion_operations(&self.knowledge_base_id) => result,
            };

            let operations = match result {
                Ok(operations) => operations,
                Err(e) => {
                    warn!(
                        knowledge_base_id = %self.knowledge_base_id,
                        error = %e,
                        "Failed to poll ingestion status, retrying"
                    );
                    continue;
                }
            };

            if any_active(&operations) {
                if tx.send(PollEvent::Progress(operations)).is_err() {
                    break;
                }
                continue;
            }

            info!(
                knowledge_base_id = %self.knowledge_base_id,
                operations = operations.len(),
                "No active ingestion operations, refreshing"
            );
            let _ = tx.send(PollEvent::Refresh(operations));
            break;
        }

        debug!(knowledge_base_id = %self.knowledge_base_id, "Ingestion poller stopped");
    }
}

/// Owner of a running poller task
#[derive(Debug)]
pub struct PollerHandle {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl PollerHandle {
    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(|task| task.is_finished())
    }

    /// Wait for the task to end on its own or after [`stop`](Self::stop)
    pub async fn wait(mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Ingestion poller task failed");
            }
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
