//! Event multiplexer: the webhook feeds a single inbound queue, the loop fans
//! each event out to its own dispatch task.

use crate::dispatcher::IntentDispatcher;
use mg_messenger::InboundEvent;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

pub struct Gateway {
    dispatcher: Arc<IntentDispatcher>,
    inbound_rx: mpsc::Receiver<InboundEvent>,
}

impl Gateway {
    pub fn new(dispatcher: Arc<IntentDispatcher>, inbound_rx: mpsc::Receiver<InboundEvent>) -> Self {
        Self {
            dispatcher,
            inbound_rx,
        }
    }

    pub fn start(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let dispatched = self.run_loop(shutdown).await;
            tracing::info!(dispatched, "gateway loop exited");
        })
    }

    /// Runs until the queue closes or shutdown fires, then waits for the
    /// dispatch tasks already in flight.
    #[tracing::instrument(level = "info", skip_all)]
    async fn run_loop(mut self, shutdown: CancellationToken) -> u64 {
        let mut in_flight = JoinSet::new();
        let mut dispatched = 0u64;
        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => break,
                event = self.inbound_rx.recv() => event,
            };
            let Some(event) = event else {
                break;
            };

            let dispatcher = self.dispatcher.clone();
            in_flight.spawn(async move {
                dispatcher.dispatch(event).await;
            });
            dispatched += 1;

            // Reap finished tasks so the set stays small on a long-running loop.
            while let Some(joined) = in_flight.try_join_next() {
                log_join(joined);
            }
        }

        while let Some(joined) = in_flight.join_next().await {
            log_join(joined);
        }
        dispatched
    }
}

fn log_join(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        tracing::error!(error = %e, "dispatch task failed");
    }
}
