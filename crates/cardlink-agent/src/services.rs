//! Running agent services and their shutdown order.

use crate::config_watch::ConfigWatcher;
use crate::orchestrator::Orchestrator;
use crate::probe::ReachabilityProbe;
use cardlink_hardware::CardReader;
use cardlink_queue::{QueueClient, ResultPublisher};
use std::time::Duration;
use tracing::info;

/// Every long-running part of the agent, started by the caller.
pub struct Services<P, B> {
    pub watcher: ConfigWatcher,
    pub reader: CardReader,
    pub queue: QueueClient,
    pub orchestrator: Orchestrator<P, B>,
}

impl<P, B> Services<P, B>
where
    P: ResultPublisher + 'static,
    B: ReachabilityProbe + 'static,
{
    /// Stop everything, consumer first.
    ///
    /// The consumer stops before the orchestrator drops its command
    /// receiver, so a delivery still in flight is left unacknowledged and
    /// the broker requeues it when the connection closes.
    pub async fn shutdown(mut self, orchestrator_timeout: Duration) {
        self.queue.stop().await;
        self.orchestrator.stop(orchestrator_timeout).await;
        self.reader.stop().await;
        self.watcher.stop().await;
        info!("Agent services stopped");
    }
}
