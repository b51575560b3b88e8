// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Coordination operations
//!
//! The handlers and background tasks never touch the [`RequestStore`]
//! directly; they go through [`Broker`], which runs each operation as a
//! critical section on the shared [`Interlock`].

use std::time::Duration;

use bytes::Bytes;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::interlock::{Interlock, InterlockError};
use crate::store::{Claim, Delivery, Reply, RequestStore, Scrape};

/// Shared broker state.
#[derive(Debug)]
pub struct Broker {
    interlock: Interlock<RequestStore>,
}

impl Default for Broker {
    fn default() -> Self {
        Self::new()
    }
}

impl Broker {
    pub fn new() -> Self {
        Self {
            interlock: Interlock::new(RequestStore::new()),
        }
    }

    /// Record that an agent instance launched at `epoch` is polling.
    pub async fn advance_epoch(
        &self,
        cancel: &CancellationToken,
        fqdn: &str,
        epoch: i64,
    ) -> Result<(), InterlockError> {
        self.interlock
            .run(cancel, |store| store.advance_epoch(fqdn, epoch))
            .await
    }

    /// Wait for and claim the oldest unclaimed scrape for `fqdn`.
    ///
    /// Resolves to [`Claim::Superseded`] as soon as a newer epoch is on
    /// record, including one that arrives while waiting.
    pub async fn claim_next_scrape(
        &self,
        cancel: &CancellationToken,
        fqdn: &str,
        epoch: i64,
    ) -> Result<Claim, InterlockError> {
        self.interlock
            .run(cancel, |store| store.claim_next(fqdn, epoch))
            .await
    }

    /// Queue a scrape for `fqdn`.
    pub async fn enqueue_scrape(
        &self,
        cancel: &CancellationToken,
        fqdn: &str,
        id: &str,
        request: Bytes,
        created: Instant,
    ) -> Result<(), InterlockError> {
        let mut scrape = Some(Scrape::new(id, request, created));
        self.interlock
            .run(cancel, |store| match scrape.take() {
                Some(scrape) => store.enqueue(fqdn, scrape),
                None => std::task::Poll::Ready(()),
            })
            .await
    }

    /// Attach a pushed response to scrape `id`.
    pub async fn deliver_result(
        &self,
        cancel: &CancellationToken,
        fqdn: &str,
        id: &str,
        response: Bytes,
    ) -> Result<Delivery, InterlockError> {
        self.interlock
            .run(cancel, |store| store.deliver(fqdn, id, response.clone()))
            .await
    }

    /// Wait until scrape `id` is answered or gone.
    pub async fn await_result(
        &self,
        cancel: &CancellationToken,
        fqdn: &str,
        id: &str,
    ) -> Result<Reply, InterlockError> {
        self.interlock
            .run(cancel, |store| store.take_result(fqdn, id))
            .await
    }

    /// Remove every scrape older than `window` as of `now`.
    pub async fn sweep(
        &self,
        cancel: &CancellationToken,
        now: Instant,
        window: Duration,
    ) -> Result<usize, InterlockError> {
        self.interlock
            .run(cancel, |store| {
                std::task::Poll::Ready(store.purge_expired(now, window))
            })
            .await
    }

    /// Wake all waiters so they re-check cancellation.
    pub fn pulse(&self) {
        self.interlock.pulse();
    }

    /// Total scrapes currently held.
    pub fn scrape_count(&self) -> usize {
        self.interlock.inspect(RequestStore::scrape_count)
    }

    /// Launch epoch on record for `fqdn`, if the identity was ever seen.
    pub fn launch_epoch(&self, fqdn: &str) -> Option<i64> {
        self.interlock
            .inspect(|store| store.agent_record(fqdn).map(|a| a.launch_epoch))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)]

    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_claim_waits_for_enqueue() {
        let broker = Arc::new(Broker::new());
        let cancel = CancellationToken::new();

        let poller = {
            let broker = Arc::clone(&broker);
            let cancel = cancel.clone();
            tokio::spawn(async move { broker.claim_next_scrape(&cancel, "host1", 0).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!poller.is_finished());

        broker
            .enqueue_scrape(&cancel, "host1", "a", Bytes::from_static(b"req"), Instant::now())
            .await
            .unwrap();

        let claim = tokio::time::timeout(Duration::from_secs(5), poller)
            .await
            .expect("poller should wake on enqueue")
            .unwrap()
            .unwrap();
        assert_eq!(
            claim,
            Claim::Scrape {
                id: "a".to_string(),
                request: Bytes::from_static(b"req"),
            }
        );
    }

    #[tokio::test]
    async fn test_newer_epoch_supersedes_waiting_poller() {
        let broker = Arc::new(Broker::new());
        let cancel = CancellationToken::new();
        broker.advance_epoch(&cancel, "host1", 100).await.unwrap();

        let old = {
            let broker = Arc::clone(&broker);
            let cancel = cancel.clone();
            tokio::spawn(async move { broker.claim_next_scrape(&cancel, "host1", 100).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        broker.advance_epoch(&cancel, "host1", 200).await.unwrap();

        let claim = tokio::time::timeout(Duration::from_secs(5), old)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(claim, Claim::Superseded);
        assert_eq!(broker.launch_epoch("host1"), Some(200));
    }

    #[tokio::test]
    async fn test_await_result_resolves_on_delivery() {
        let broker = Arc::new(Broker::new());
        let cancel = CancellationToken::new();
        broker
            .enqueue_scrape(&cancel, "host1", "a", Bytes::new(), Instant::now())
            .await
            .unwrap();

        let waiter = {
            let broker = Arc::clone(&broker);
            let cancel = cancel.clone();
            tokio::spawn(async move { broker.await_result(&cancel, "host1", "a").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let delivery = broker
            .deliver_result(&cancel, "host1", "a", Bytes::from_static(b"resp"))
            .await
            .unwrap();
        assert_eq!(delivery, Delivery::Recorded);

        let reply = waiter.await.unwrap().unwrap();
        assert_eq!(reply, Reply::Answered(Bytes::from_static(b"resp")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_turns_pending_wait_into_lost() {
        let broker = Arc::new(Broker::new());
        let cancel = CancellationToken::new();
        let window = Duration::from_secs(300);
        broker
            .enqueue_scrape(&cancel, "host1", "a", Bytes::new(), Instant::now())
            .await
            .unwrap();

        let waiter = {
            let broker = Arc::clone(&broker);
            let cancel = cancel.clone();
            tokio::spawn(async move { broker.await_result(&cancel, "host1", "a").await })
        };
        tokio::task::yield_now().await;

        tokio::time::advance(window).await;
        assert_eq!(broker.sweep(&cancel, Instant::now(), window).await.unwrap(), 0);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(broker.sweep(&cancel, Instant::now(), window).await.unwrap(), 1);

        assert_eq!(waiter.await.unwrap().unwrap(), Reply::Lost);
        assert_eq!(broker.scrape_count(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_waiter_returns_after_pulse() {
        let broker = Arc::new(Broker::new());
        let cancel = CancellationToken::new();

        let poller = {
            let broker = Arc::clone(&broker);
            let cancel = cancel.clone();
            tokio::spawn(async move { broker.claim_next_scrape(&cancel, "host1", 0).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        cancel.cancel();
        broker.pulse();

        let result = tokio::time::timeout(Duration::from_secs(5), poller)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result, Err(InterlockError::Cancelled));
    }
}
