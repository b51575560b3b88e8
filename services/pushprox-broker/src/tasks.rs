// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Background tasks: the retention sweeper and the cancellation pulse.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::broker::Broker;

/// Periodically drop scrapes older than `retention`.
///
/// The first pass runs immediately; after that one pass per `retention`.
pub fn spawn_sweeper(
    broker: Arc<Broker>,
    retention: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(retention);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match broker.sweep(&shutdown, Instant::now(), retention).await {
                Ok(0) => debug!("Retention sweep found nothing to remove"),
                Ok(removed) => info!(removed, "Removed expired scrapes"),
                Err(e) => {
                    debug!(error = %e, "Retention sweep interrupted");
                    break;
                }
            }
        }
        debug!("Retention sweeper stopped");
    })
}

/// Periodically wake every waiter so cancelled ones notice.
pub fn spawn_pulse(
    broker: Arc<Broker>,
    period: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => broker.pulse(),
            }
        }
        // Let anyone still parked see the shutdown.
        broker.pulse();
        debug!("Pulse task stopped");
    })
}
