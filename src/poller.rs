//! Wait-for-completion loop over status queries.

use crate::client::HubClient;
use crate::config::HubConfig;
use crate::error::{Failure, HubError};
use crate::response::Envelope;
use crate::session::{Observation, OutputReport, SessionStatus, SessionTracker, StatusAnomaly};
use serde::{Serialize, Serializer};
use std::time::Duration;
use tokio::time::{sleep_until, timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self::from_config(&HubConfig::default())
    }
}

impl WaitOptions {
    pub fn from_config(config: &HubConfig) -> Self {
        Self {
            timeout: config.wait_timeout(),
            poll_interval: config.poll_interval(),
        }
    }
}

fn as_secs<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WaitOutcome {
    /// Finished successfully; the output was fetched once.
    Completed { output: Envelope<OutputReport> },
    Failed { error: Option<String> },
    /// Cancelled on the remote side.
    Cancelled,
    /// The wait budget ran out. The remote session keeps running.
    TimedOut {
        #[serde(serialize_with = "as_secs")]
        elapsed: Duration,
    },
    /// The caller's token fired.
    Aborted,
    /// A non-retryable failure on a status query.
    Error { failure: Failure },
}

impl WaitOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            WaitOutcome::Completed { .. } => "completed",
            WaitOutcome::Failed { .. } => "failed",
            WaitOutcome::Cancelled => "cancelled",
            WaitOutcome::TimedOut { .. } => "timed_out",
            WaitOutcome::Aborted => "aborted",
            WaitOutcome::Error { .. } => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitReport {
    pub session_id: String,
    pub outcome: WaitOutcome,
    #[serde(serialize_with = "as_secs")]
    pub elapsed: Duration,
    pub polls: u32,
    pub last_status: Option<SessionStatus>,
    pub anomalies: Vec<StatusAnomaly>,
}

/// Poll `session_id` until it reaches a terminal state, the timeout
/// elapses, or `cancel` fires.
///
/// Consecutive status queries start at least `poll_interval` apart, and no
/// sleep or query runs past the deadline. Transport errors are retried at
/// the next interval; any other failure ends the wait.
pub async fn wait_for_completion(
    client: &HubClient,
    session_id: &str,
    options: WaitOptions,
    cancel: CancellationToken,
) -> Result<WaitReport, HubError> {
    let started = Instant::now();
    let deadline = started + options.timeout;
    let mut tracker = SessionTracker::new();
    let mut polls = 0u32;
    let mut last_status = None;
    let mut anomalies = Vec::new();

    debug!(
        "Waiting for session {} (timeout {:?}, interval {:?})",
        session_id, options.timeout, options.poll_interval
    );

    let outcome = loop {
        let query_start = Instant::now();
        if query_start >= deadline {
            break WaitOutcome::TimedOut {
                elapsed: query_start - started,
            };
        }

        polls += 1;
        let envelope = tokio::select! {
            biased;
            _ = cancel.cancelled() => break WaitOutcome::Aborted,
            result = timeout_at(deadline, client.get_session_status(session_id)) => match result {
                Ok(envelope) => envelope?,
                Err(_) => {
                    debug!("Status query for {} outlived the wait budget", session_id);
                    continue;
                }
            },
        };

        match envelope.into_result() {
            Ok(session) => {
                match tracker.observe(session_id, &session.status) {
                    Ok(Observation::Advanced { from: Some(from), to }) => {
                        info!("Session {} moved {} -> {}", session_id, from, to);
                    }
                    Ok(_) => {}
                    Err(anomaly) => anomalies.push(anomaly),
                }
                last_status = Some(session.status.clone());

                match session.status {
                    SessionStatus::Completed => {
                        let output = tokio::select! {
                            biased;
                            _ = cancel.cancelled() => break WaitOutcome::Aborted,
                            result = timeout_at(deadline, client.get_session_output(session_id)) => match result {
                                Ok(envelope) => envelope?,
                                Err(_) => {
                                    warn!("Output fetch for {} outlived the wait budget", session_id);
                                    Envelope::failure(Failure::transport(
                                        "output fetch outlived the wait budget",
                                    ))
                                }
                            },
                        };
                        break WaitOutcome::Completed { output };
                    }
                    SessionStatus::Failed => break WaitOutcome::Failed {
                        error: session.error,
                    },
                    SessionStatus::Cancelled => break WaitOutcome::Cancelled,
                    _ => {}
                }
            }
            Err(failure) if failure.is_transport() => {
                warn!(
                    "Status query for {} failed, retrying: {}",
                    session_id, failure.message
                );
            }
            Err(failure) => break WaitOutcome::Error { failure },
        }

        let wake = (query_start + options.poll_interval).min(deadline);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break WaitOutcome::Aborted,
            _ = sleep_until(wake) => {}
        }
    };

    let elapsed = started.elapsed();
    info!(
        "Wait for session {} ended: {} after {} polls ({:.1}s)",
        session_id,
        outcome.label(),
        polls,
        elapsed.as_secs_f64()
    );

    Ok(WaitReport {
        session_id: session_id.to_string(),
        outcome,
        elapsed,
        polls,
        last_status,
        anomalies,
    })
}
