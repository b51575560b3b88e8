// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! In-memory request store
//!
//! Maps each agent identity to its launch epoch and its queue of in-flight
//! scrapes. The methods here are the critical sections run by
//! [`crate::broker::Broker`] through the interlock; each one returns
//! `Poll::Pending` when the caller has to wait for somebody else.
//!
//! Every transition is one-way: a scrape is claimed at most once, answered at
//! most once, and removed only by [`RequestStore::purge_expired`]. Epochs only
//! grow.
//!
//! Collectors choose the identity through the `Host` header, so records are
//! also reclaimed once they carry nothing: no scrapes and an epoch no agent
//! ever advanced. Such a record is indistinguishable from a freshly created
//! one. Identities an agent has polled for keep their epoch for the life of
//! the process.

use std::collections::HashMap;
use std::task::Poll;
use std::time::Duration;

use bytes::Bytes;
use pushprox_api::{Fqdn, ScrapeId};
use tokio::time::Instant;

use crate::interlock::Generation;

/// One tunneled request/response exchange.
#[derive(Debug, Clone)]
pub struct Scrape {
    pub id: ScrapeId,
    pub created: Instant,
    /// Raw HTTP/1.1 request to run against the target
    pub request: Bytes,
    /// Set once an agent has taken the request
    pub claimed: bool,
    /// Raw HTTP/1.1 response, absent while pending
    pub response: Option<Bytes>,
    /// Set once the waiting collector picked the response up
    pub delivered: bool,
}

impl Scrape {
    pub fn new(id: impl Into<ScrapeId>, request: Bytes, created: Instant) -> Self {
        Self {
            id: id.into(),
            created,
            request,
            claimed: false,
            response: None,
            delivered: false,
        }
    }
}

/// Per-identity state.
#[derive(Debug, Default)]
pub struct AgentRecord {
    pub launch_epoch: i64,
    /// Oldest first
    pub scrapes: Vec<Scrape>,
}

impl AgentRecord {
    /// Holds nothing a default record would not.
    fn is_vacant(&self) -> bool {
        self.launch_epoch == 0 && self.scrapes.is_empty()
    }
}

/// Result of claiming work for an agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claim {
    /// The poller's epoch is older than the newest one recorded
    Superseded,
    Scrape { id: ScrapeId, request: Bytes },
}

/// What happened to a pushed response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Recorded,
    /// An earlier push already answered this scrape; the new bytes are dropped
    AlreadyAnswered,
    /// No such scrape, most likely already swept
    Unknown,
}

/// Outcome of waiting for a scrape's response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// The scrape no longer exists
    Lost,
    Answered(Bytes),
}

/// All coordination state of the broker.
#[derive(Debug, Default)]
pub struct RequestStore {
    agents: HashMap<Fqdn, AgentRecord>,
    generation: u64,
}

impl Generation for RequestStore {
    fn generation(&self) -> u64 {
        self.generation
    }
}

impl RequestStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn touch(&mut self) {
        self.generation += 1;
    }

    /// Get the record for `fqdn`, creating it on first reference.
    fn agent(&mut self, fqdn: &str) -> &mut AgentRecord {
        let generation = &mut self.generation;
        self.agents.entry(fqdn.to_string()).or_insert_with(|| {
            *generation += 1;
            AgentRecord::default()
        })
    }

    /// Raise the recorded epoch for `fqdn` to at least `epoch`.
    pub fn advance_epoch(&mut self, fqdn: &str, epoch: i64) -> Poll<()> {
        let agent = self.agent(fqdn);
        if epoch > agent.launch_epoch {
            agent.launch_epoch = epoch;
            self.touch();
        }
        Poll::Ready(())
    }

    /// Claim the oldest unclaimed scrape for `fqdn`.
    pub fn claim_next(&mut self, fqdn: &str, epoch: i64) -> Poll<Claim> {
        let agent = self.agent(fqdn);
        if epoch < agent.launch_epoch {
            return Poll::Ready(Claim::Superseded);
        }

        let Some(scrape) = agent.scrapes.iter_mut().find(|s| !s.claimed) else {
            return Poll::Pending;
        };
        scrape.claimed = true;
        let claim = Claim::Scrape {
            id: scrape.id.clone(),
            request: scrape.request.clone(),
        };
        self.touch();
        Poll::Ready(claim)
    }

    /// Append a new scrape to the back of `fqdn`'s queue.
    pub fn enqueue(&mut self, fqdn: &str, scrape: Scrape) -> Poll<()> {
        self.agent(fqdn).scrapes.push(scrape);
        self.touch();
        Poll::Ready(())
    }

    /// Record the response for scrape `id`. The first response wins.
    pub fn deliver(&mut self, fqdn: &str, id: &str, response: Bytes) -> Poll<Delivery> {
        let agent = self.agent(fqdn);
        let Some(scrape) = agent.scrapes.iter_mut().find(|s| s.id == id) else {
            return Poll::Ready(Delivery::Unknown);
        };
        if scrape.response.is_some() {
            return Poll::Ready(Delivery::AlreadyAnswered);
        }
        scrape.response = Some(response);
        self.touch();
        Poll::Ready(Delivery::Recorded)
    }

    /// Take the response for scrape `id` once one is present.
    pub fn take_result(&mut self, fqdn: &str, id: &str) -> Poll<Reply> {
        let agent = self.agent(fqdn);
        let Some(scrape) = agent.scrapes.iter_mut().find(|s| s.id == id) else {
            return Poll::Ready(Reply::Lost);
        };
        let Some(response) = scrape.response.clone() else {
            return Poll::Pending;
        };
        if !scrape.delivered {
            scrape.delivered = true;
            self.touch();
        }
        Poll::Ready(Reply::Answered(response))
    }

    /// Drop every scrape older than `window` as of `now`, whatever its state,
    /// then forget identities left with no state of their own.
    ///
    /// Returns the number of scrapes removed.
    pub fn purge_expired(&mut self, now: Instant, window: Duration) -> usize {
        let mut removed = 0;
        for agent in self.agents.values_mut() {
            let before = agent.scrapes.len();
            agent
                .scrapes
                .retain(|s| now.saturating_duration_since(s.created) <= window);
            removed += before - agent.scrapes.len();
        }

        let identities = self.agents.len();
        self.agents.retain(|_, agent| !agent.is_vacant());
        if removed > 0 || self.agents.len() != identities {
            self.touch();
        }
        removed
    }

    /// Number of identities currently on record.
    pub fn identity_count(&self) -> usize {
        self.agents.len()
    }

    pub fn agent_record(&self, fqdn: &str) -> Option<&AgentRecord> {
        self.agents.get(fqdn)
    }

    /// Total scrapes held across all agents.
    pub fn scrape_count(&self) -> usize {
        self.agents.values().map(|a| a.scrapes.len()).sum()
    }
}
