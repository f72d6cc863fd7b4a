//! Stage execution with bounded retry.
//!
//! Required stages run through [`run_required`]: a fixed attempt budget with
//! a fixed delay between attempts, and a hard error once the budget is spent.
//! Optional stages run through [`run_optional`], which never fails and
//! reports what happened as a [`StageOutcome`].

use std::fmt;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::error::ServiceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Conversion,
    TreeBuild,
    Extraction,
    Citations,
    Embedding,
    Episode,
}

impl Stage {
    /// Short name used for span and log keys.
    pub fn key(&self) -> &'static str {
        match self {
            Stage::Conversion => "conversion",
            Stage::TreeBuild => "tree_build",
            Stage::Extraction => "extraction",
            Stage::Citations => "citations",
            Stage::Embedding => "embedding",
            Stage::Episode => "episode",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Conversion => "Structural conversion",
            Stage::TreeBuild => "Hierarchical tree build",
            Stage::Extraction => "Metadata extraction",
            Stage::Citations => "Citation parsing",
            Stage::Embedding => "Embedding generation",
            Stage::Episode => "Graph episode write",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, first call included. Never below 1.
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    /// `retries` extra attempts after the first.
    pub fn with_retries(retries: u32, delay: Duration) -> Self {
        Self::attempts(retries.saturating_add(1), delay)
    }

    pub fn attempts(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    pub fn once() -> Self {
        Self::attempts(1, Duration::ZERO)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::once()
    }
}

#[derive(Error, Debug)]
pub enum StageError {
    #[error("{stage} failed after {attempts} attempts: {source}")]
    Exhausted {
        stage: Stage,
        attempts: u32,
        #[source]
        source: ServiceError,
    },

    #[error("{stage} failed: {source}")]
    Failed {
        stage: Stage,
        #[source]
        source: ServiceError,
    },
}

impl StageError {
    pub fn stage(&self) -> Stage {
        match self {
            StageError::Exhausted { stage, .. } | StageError::Failed { stage, .. } => *stage,
        }
    }
}

/// Runs a required stage. `call` receives the 1-based attempt number.
pub async fn run_required<T, F, Fut>(
    stage: Stage,
    policy: &RetryPolicy,
    mut call: F,
) -> Result<T, StageError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ServiceError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match call(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(stage = stage.key(), attempt, "stage succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if attempt < max_attempts => {
                warn!("{} attempt {} failed: {}", stage, attempt, e);
                if !policy.delay.is_zero() {
                    tokio::time::sleep(policy.delay).await;
                }
                attempt += 1;
            }
            Err(source) if max_attempts > 1 => {
                return Err(StageError::Exhausted {
                    stage,
                    attempts: attempt,
                    source,
                });
            }
            Err(source) => return Err(StageError::Failed { stage, source }),
        }
    }
}

/// Result of a best-effort stage.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome<T> {
    Produced(T),
    /// The stage ran but had nothing to contribute.
    Absent,
    Failed(String),
}

impl<T> StageOutcome<T> {
    pub fn produced(self) -> Option<T> {
        match self {
            StageOutcome::Produced(value) => Some(value),
            StageOutcome::Absent | StageOutcome::Failed(_) => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, StageOutcome::Failed(_))
    }
}

/// Runs an optional stage once. Failures are logged and returned as
/// [`StageOutcome::Failed`], never raised.
pub async fn run_optional<T, Fut>(stage: Stage, fut: Fut) -> StageOutcome<T>
where
    Fut: Future<Output = Result<Option<T>, ServiceError>>,
{
    match fut.await {
        Ok(Some(value)) => StageOutcome::Produced(value),
        Ok(None) => StageOutcome::Absent,
        Err(e) => {
            warn!("{} failed, continuing without it: {}", stage, e);
            StageOutcome::Failed(e.to_string())
        }
    }
}
