// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Retry decisions for items found locked by the queue.
//
// Only lock contention is retried.  A locked item moves through
// `Locked -> delay -> Requeued` until its retry count passes the cap, at which
// point it is dropped with a surfaced error and the source file is kept.

use std::time::Duration;

use tracing::{debug, warn};

use labelwerk_core::config::PipelineConfig;

/// Lock-retry configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed after the first locked probe.
    pub max_retries: u32,
    /// Fixed delay before a locked item goes back on the queue.
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            retry_delay: config.retry_delay(),
        }
    }
}

/// What to do with an item whose file was locked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Re-enqueue at the tail after this delay.
    RetryAfter(Duration),
    /// Retry budget spent; give up.
    Exhausted,
}

/// Decide based on the retry count *after* it was incremented for the
/// current locked probe.
pub fn decide_lock_retry(retry_count: u32, policy: &RetryPolicy) -> RetryDecision {
    if retry_count <= policy.max_retries {
        debug!(
            retry_count,
            max = policy.max_retries,
            delay_ms = policy.retry_delay.as_millis() as u64,
            "file locked, scheduling retry"
        );
        RetryDecision::RetryAfter(policy.retry_delay)
    } else {
        warn!(retry_count, max = policy.max_retries, "lock retry limit exhausted");
        RetryDecision::Exhausted
    }
}
