use super::types::*;
use crate::client::HubClient;
use crate::error::HubError;
use crate::poller::{wait_for_completion, WaitOptions, WaitReport};
use crate::response::Envelope;
use crate::session::SessionTracker;
use chrono::Utc;
use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Creates, starts, and watches groups of related sessions.
///
/// Keeps a tracker of every member it has seen so `start` gating and
/// status anomalies carry across calls.
pub struct GroupManager {
    client: HubClient,
    tracker: SessionTracker,
}

impl GroupManager {
    pub fn new(client: HubClient) -> Self {
        Self {
            client,
            tracker: SessionTracker::new(),
        }
    }

    pub fn tracker(&self) -> &SessionTracker {
        &self.tracker
    }

    /// Create every task as its own session, in declaration order. A
    /// sibling reference is replaced by that sibling's session id.
    pub async fn create_group(&mut self, spec: &GroupSpec) -> Result<OrchestrationGroup, GroupError> {
        let plan = spec.plan()?;
        let repository = spec.repository.trim();
        let mut members: Vec<GroupMember> = Vec::with_capacity(plan.len());

        info!("Creating group '{}' with {} sessions", spec.name, plan.len());

        for task in &plan {
            let dependency_ids = task
                .depends_on
                .iter()
                .map(|&index| members[index].session_id.clone())
                .collect();
            let params = task.create_params(repository, dependency_ids);

            let envelope = match self.client.create_session(&params).await {
                Ok(envelope) => envelope,
                Err(e) => {
                    warn!("Group '{}' aborted at task {}: {}", spec.name, task.index, e);
                    return Err(GroupError::Hub(e));
                }
            };

            match envelope.into_result() {
                Ok(session) => {
                    debug!("Task {} created as session {}", task.index, session.id);
                    self.tracker.record_created(&session.id);
                    members.push(GroupMember {
                        index: task.index,
                        task_name: task.name.clone(),
                        session_id: session.id,
                    });
                }
                Err(failure) => {
                    warn!(
                        "Group '{}' aborted at task {} after {} sessions: {}",
                        spec.name,
                        task.index,
                        members.len(),
                        failure
                    );
                    return Err(GroupError::Aborted {
                        task: Some(task.index),
                        failure,
                        created: members,
                    });
                }
            }
        }

        Ok(OrchestrationGroup {
            id: None,
            name: spec.name.trim().to_string(),
            description: spec.description.clone(),
            repository: repository.to_string(),
            members,
            created_at: Utc::now(),
        })
    }

    /// Create the whole group with one `orchestration.create` request.
    pub async fn submit_orchestration(
        &mut self,
        spec: &GroupSpec,
    ) -> Result<Envelope<OrchestrationGroup>, HubError> {
        let receipt = match self.client.submit_orchestration(spec).await?.into_result() {
            Ok(receipt) => receipt,
            Err(failure) => return Ok(Envelope::failure(failure)),
        };

        if receipt.sessions.len() != spec.tasks.len() {
            warn!(
                "Orchestration '{}' returned {} sessions for {} tasks",
                spec.name,
                receipt.sessions.len(),
                spec.tasks.len()
            );
        }

        let members = receipt
            .sessions
            .into_iter()
            .enumerate()
            .map(|(index, session)| {
                self.tracker.record_created(&session.id);
                GroupMember {
                    index,
                    task_name: spec.tasks.get(index).and_then(|t| t.name.clone()),
                    session_id: session.id,
                }
            })
            .collect();

        Ok(Envelope::success(OrchestrationGroup {
            id: receipt.id,
            name: receipt.name.unwrap_or_else(|| spec.name.trim().to_string()),
            description: spec.description.clone(),
            repository: spec.repository.trim().to_string(),
            members,
            created_at: Utc::now(),
        }))
    }

    /// Issue `start` for every member in order. Members with unmet
    /// dependencies come back queued.
    pub async fn start_group(
        &mut self,
        group: &OrchestrationGroup,
    ) -> Result<Vec<MemberStart>, HubError> {
        let mut results = Vec::with_capacity(group.members.len());

        for member in &group.members {
            let envelope = self.client.start_session(&member.session_id).await?;
            let mut anomaly = None;
            match envelope.entity() {
                Some(ack) => {
                    if ack.is_queued() {
                        info!(
                            "Session {} queued behind {:?}",
                            member.session_id, ack.waiting_for
                        );
                    }
                    anomaly = self.tracker.record_start(&member.session_id, &ack.status).err();
                }
                None => {
                    if let Some(error) = envelope.error() {
                        warn!("Failed to start session {}: {}", member.session_id, error);
                    }
                }
            }
            results.push(MemberStart {
                session_id: member.session_id.clone(),
                envelope,
                anomaly,
            });
        }

        Ok(results)
    }

    /// Query every member concurrently and aggregate.
    pub async fn aggregate_status(&mut self, group: &OrchestrationGroup) -> Result<GroupStatus, HubError> {
        let queries = group
            .members
            .iter()
            .map(|member| self.client.get_session_status(&member.session_id));
        let envelopes = join_all(queries).await;

        let mut members = Vec::with_capacity(group.members.len());
        for (member, envelope) in group.members.iter().zip(envelopes) {
            let mut status = MemberStatus {
                session_id: member.session_id.clone(),
                task_name: member.task_name.clone(),
                status: None,
                runnable: false,
                error: None,
                anomaly: None,
            };

            match envelope?.into_result() {
                Ok(session) => {
                    if let Err(anomaly) = self.tracker.observe(&member.session_id, &session.status) {
                        status.anomaly = Some(anomaly);
                    }
                    status.status = Some(session.status);
                }
                Err(failure) => status.error = Some(failure),
            }
            status.runnable = self.tracker.is_runnable(&member.session_id);
            members.push(status);
        }

        Ok(GroupStatus::from_members(group.name.clone(), members))
    }

    /// Wait for every member at once. Each member gets its own loop and
    /// its own report.
    pub async fn wait_for_group(
        &mut self,
        group: &OrchestrationGroup,
        options: WaitOptions,
        cancel: CancellationToken,
    ) -> Result<Vec<WaitReport>, HubError> {
        let waits = group.session_ids().map(|session_id| {
            wait_for_completion(&self.client, session_id, options, cancel.child_token())
        });
        let mut reports = join_all(waits)
            .await
            .into_iter()
            .collect::<Result<Vec<_>, _>>()?;

        for report in &mut reports {
            if let Some(status) = &report.last_status {
                if let Err(anomaly) = self.tracker.observe(&report.session_id, status) {
                    report.anomalies.push(anomaly);
                }
            }
        }

        Ok(reports)
    }
}
