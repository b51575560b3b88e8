// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! API context for the pushprox broker

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::broker::Broker;
use crate::config::BrokerConfig;
use crate::tasks;

/// API context shared across all request handlers
pub struct ApiContext {
    broker: Arc<Broker>,
    shutdown: CancellationToken,
}

impl ApiContext {
    /// Create the shared broker and start its background tasks.
    ///
    /// Must be called from within a tokio runtime. The tasks stop when
    /// `shutdown` is cancelled.
    pub fn new(config: &BrokerConfig, shutdown: CancellationToken) -> Self {
        let broker = Arc::new(Broker::new());
        tasks::spawn_sweeper(Arc::clone(&broker), config.retention, shutdown.clone());
        tasks::spawn_pulse(Arc::clone(&broker), config.pulse_interval, shutdown.clone());

        Self { broker, shutdown }
    }

    pub fn broker(&self) -> &Broker {
        &self.broker
    }

    /// Cancelled when the broker is shutting down
    pub fn shutdown(&self) -> &CancellationToken {
        &self.shutdown
    }
}
