// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Mutate-or-wait rendezvous over a single shared state
//!
//! # Purpose
//!
//! Every actor in the broker (collector handlers, agent handlers, the
//! retention sweeper) talks to the others only by changing one shared value.
//! [`Interlock::run`] executes a caller-supplied critical section against that
//! value under one lock. The section either finishes (`Poll::Ready`) or
//! reports that what it needs is not there yet (`Poll::Pending`), in which
//! case the caller sleeps until somebody else changes the state and then
//! re-evaluates the section from scratch.
//!
//! # Correctness Invariants
//!
//! - **Change broadcast**: if a section bumps the state's generation, every
//!   parked caller is woken before the lock is released.
//! - **No lost wakeups**: a caller registers for the next broadcast while it
//!   still holds the lock, so a change made between its evaluation and its
//!   sleep is always observed.
//! - **Cancellation is never silent**: after every evaluation that did not
//!   finish, the caller's token is checked and the call fails with
//!   [`InterlockError::Cancelled`].
//! - **Progress**: sections must only make one-way transitions (claim once,
//!   answer once, remove once) so two callers can never keep undoing each
//!   other and waking each other forever.
//!
//! # Design Notes
//!
//! - Parked callers wait on the broadcast alone, not on their token. A
//!   periodic [`Interlock::pulse`] wakes everyone so each re-checks its token
//!   even when nothing is changing.
//! - The lock is a `std::sync::Mutex`: sections are short and synchronous and
//!   the guard never lives across an `.await`.

use std::sync::{Mutex, MutexGuard};
use std::task::Poll;

use thiserror::Error;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Errors returned by [`Interlock::run`]
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InterlockError {
    /// The caller's cancellation token fired while it was waiting
    #[error("operation cancelled while waiting for shared state")]
    Cancelled,
}

/// State that can report whether a critical section changed it.
pub trait Generation {
    /// Monotonic counter bumped by every mutation.
    fn generation(&self) -> u64;
}

/// A shared value plus the wake-up channel for callers waiting on it.
#[derive(Debug)]
pub struct Interlock<S> {
    state: Mutex<S>,
    changed: Notify,
}

impl<S: Generation> Interlock<S> {
    pub fn new(state: S) -> Self {
        Self {
            state: Mutex::new(state),
            changed: Notify::new(),
        }
    }

    /// Lock state with poison recovery.
    ///
    /// A panic inside one critical section must not take the whole broker
    /// down; the state it left behind is still structurally valid because
    /// sections only make single-field transitions.
    fn lock(&self) -> MutexGuard<'_, S> {
        self.state.lock().unwrap_or_else(|poisoned| {
            tracing::error!("Interlock mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Run `section` until it returns `Poll::Ready`.
    ///
    /// The section may run many times; it must be safe to re-evaluate and
    /// must bump the state's generation whenever it mutates anything.
    pub async fn run<T, F>(
        &self,
        cancel: &CancellationToken,
        mut section: F,
    ) -> Result<T, InterlockError>
    where
        F: FnMut(&mut S) -> Poll<T>,
    {
        loop {
            let changed = {
                let mut state = self.lock();
                let before = state.generation();
                let outcome = section(&mut *state);
                if state.generation() != before {
                    self.changed.notify_waiters();
                }
                if let Poll::Ready(value) = outcome {
                    return Ok(value);
                }
                if cancel.is_cancelled() {
                    return Err(InterlockError::Cancelled);
                }
                // Registered under the lock: any later mutation must take the
                // lock first, so its broadcast cannot slip past us.
                self.changed.notified()
            };
            changed.await;
        }
    }

    /// Wake every parked caller without touching the state.
    pub fn pulse(&self) {
        let _state = self.lock();
        self.changed.notify_waiters();
    }

    /// Read the state without waiting.
    pub fn inspect<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&*self.lock())
    }
}
