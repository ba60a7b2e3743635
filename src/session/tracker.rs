use super::types::SessionStatus;
use serde::Serialize;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, warn};

/// The remote side reported a status the cached one cannot legally move to.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
#[error("session {session_id} reported '{observed}' after '{current}'")]
pub struct StatusAnomaly {
    pub session_id: String,
    pub current: SessionStatus,
    pub observed: SessionStatus,
}

/// Result of feeding one status report into the tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// Same state as before.
    Unchanged(SessionStatus),
    /// Moved forward (or first sighting when `from` is `None`).
    Advanced {
        from: Option<SessionStatus>,
        to: SessionStatus,
    },
    /// Status string we don't understand; the cached state is left alone.
    Unrecognized(String),
}

/// Whether `from -> to` is allowed by the session state machine:
///
/// ```text
/// pending -> (queued) -> initializing -> running -> {completed | failed | cancelled}
/// ```
///
/// `queued` may be entered from `pending` or `initializing`. Forward skips
/// are legal because polling can miss intermediate states.
pub fn is_legal_transition(from: &SessionStatus, to: &SessionStatus) -> bool {
    use SessionStatus::*;

    if from == to {
        return true;
    }
    if from.is_terminal() {
        return false;
    }
    match to {
        Pending => false,
        Queued => matches!(from, Pending | Initializing),
        Initializing => matches!(from, Pending | Queued),
        Running => matches!(from, Pending | Queued | Initializing),
        Completed | Failed | Cancelled => true,
        Unknown(_) => true,
    }
}

#[derive(Debug, Clone)]
struct TrackedSession {
    status: SessionStatus,
    started: bool,
}

/// Client-side view of session states between polls.
///
/// Owned by a single flow (a wait loop, a group manager); no interior locking.
#[derive(Debug, Default)]
pub struct SessionTracker {
    sessions: HashMap<String, TrackedSession>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// A create just succeeded; the session starts out `pending`.
    pub fn record_created(&mut self, session_id: &str) {
        self.sessions
            .entry(session_id.to_string())
            .or_insert(TrackedSession {
                status: SessionStatus::Pending,
                started: false,
            });
    }

    /// A start was issued for the session, with the status the start reply carried.
    pub fn record_start(
        &mut self,
        session_id: &str,
        reported: &SessionStatus,
    ) -> Result<Observation, StatusAnomaly> {
        self.record_created(session_id);
        if let Some(entry) = self.sessions.get_mut(session_id) {
            entry.started = true;
        }
        self.observe(session_id, reported)
    }

    /// Feed a status report. Illegal transitions leave the cache untouched.
    pub fn observe(
        &mut self,
        session_id: &str,
        reported: &SessionStatus,
    ) -> Result<Observation, StatusAnomaly> {
        if let SessionStatus::Unknown(raw) = reported {
            if let Some(current) = self.status(session_id).filter(|s| s.is_terminal()) {
                let anomaly = StatusAnomaly {
                    session_id: session_id.to_string(),
                    current: current.clone(),
                    observed: reported.clone(),
                };
                warn!("Status anomaly: {}", anomaly);
                return Err(anomaly);
            }
            debug!("Session {} reported unrecognized status '{}'", session_id, raw);
            return Ok(Observation::Unrecognized(raw.clone()));
        }

        let entry = match self.sessions.entry(session_id.to_string()) {
            Entry::Occupied(occupied) => occupied.into_mut(),
            Entry::Vacant(vacant) => {
                vacant.insert(TrackedSession {
                    status: reported.clone(),
                    started: false,
                });
                return Ok(Observation::Advanced {
                    from: None,
                    to: reported.clone(),
                });
            }
        };

        if entry.status == *reported {
            return Ok(Observation::Unchanged(reported.clone()));
        }

        if !is_legal_transition(&entry.status, reported) {
            let anomaly = StatusAnomaly {
                session_id: session_id.to_string(),
                current: entry.status.clone(),
                observed: reported.clone(),
            };
            warn!("Status anomaly: {}", anomaly);
            return Err(anomaly);
        }

        if matches!(entry.status, SessionStatus::Pending | SessionStatus::Queued) && !entry.started {
            debug!(
                "Session {} left {} without a start from this client",
                session_id, entry.status
            );
        }

        let from = std::mem::replace(&mut entry.status, reported.clone());
        debug!("Session {}: {} -> {}", session_id, from, reported);
        Ok(Observation::Advanced {
            from: Some(from),
            to: reported.clone(),
        })
    }

    pub fn status(&self, session_id: &str) -> Option<&SessionStatus> {
        self.sessions.get(session_id).map(|s| &s.status)
    }

    /// True only after a start was recorded and the session is past the
    /// `pending`/`queued` gate without having finished.
    pub fn is_runnable(&self, session_id: &str) -> bool {
        self.sessions.get(session_id).is_some_and(|s| {
            s.started
                && matches!(
                    s.status,
                    SessionStatus::Initializing | SessionStatus::Running
                )
        })
    }
}
