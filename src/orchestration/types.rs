use crate::error::{Failure, HubError, ValidationError};
use crate::request::{builder, CreateSessionParams};
use crate::response::Envelope;
use crate::session::{Session, SessionStatus, SessionType, StartAck, StatusAnomaly};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// Reference from one task to an earlier sibling.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum TaskRef {
    Index(usize),
    Name(String),
}

impl std::fmt::Display for TaskRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskRef::Index(index) => write!(f, "#{}", index),
            TaskRef::Name(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskSpec {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub session_type: String,
    pub requirements: String,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default, alias = "dependencies")]
    pub depends_on: Vec<TaskRef>,
}

impl TaskSpec {
    pub fn new(session_type: impl Into<String>, requirements: impl Into<String>) -> Self {
        Self {
            name: None,
            session_type: session_type.into(),
            requirements: requirements.into(),
            context: None,
            branch: None,
            depends_on: Vec::new(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn depends_on(mut self, reference: TaskRef) -> Self {
        self.depends_on.push(reference);
        self
    }
}

/// Declarative description of a group of related sessions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GroupSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub repository: String,
    pub tasks: Vec<TaskSpec>,
}

/// A validated task with sibling references resolved to indices.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedTask {
    pub index: usize,
    pub name: Option<String>,
    pub session_type: SessionType,
    pub requirements: String,
    pub context: Option<String>,
    pub branch: Option<String>,
    pub depends_on: Vec<usize>,
}

impl PlannedTask {
    pub fn create_params(&self, repository: &str, dependency_ids: Vec<String>) -> CreateSessionParams {
        CreateSessionParams {
            session_type: self.session_type.to_string(),
            repository: repository.to_string(),
            requirements: self.requirements.clone(),
            context: self.context.clone(),
            branch: self.branch.clone(),
            dependencies: dependency_ids,
            options: Default::default(),
        }
    }
}

impl GroupSpec {
    /// Validate every task and resolve every reference, without touching
    /// the network. References must point at a task declared earlier.
    pub fn plan(&self) -> Result<Vec<PlannedTask>, ValidationError> {
        builder::validate_repository(&self.repository)?;
        if self.tasks.is_empty() {
            return Err(ValidationError::EmptyGroup);
        }

        let mut names: HashMap<&str, usize> = HashMap::new();
        for (index, task) in self.tasks.iter().enumerate() {
            let Some(name) = task.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) else {
                continue;
            };
            if names.insert(name, index).is_some() {
                return Err(ValidationError::DuplicateTaskName(name.to_string()));
            }
        }

        self.tasks
            .iter()
            .enumerate()
            .map(|(index, task)| {
                let invalid = |source: ValidationError| ValidationError::InvalidTask {
                    task: index,
                    source: Box::new(source),
                };
                let session_type = builder::validate_type(&task.session_type).map_err(invalid)?;
                let requirements =
                    builder::validate_requirements(&task.requirements).map_err(invalid)?;

                let mut depends_on = Vec::with_capacity(task.depends_on.len());
                for reference in &task.depends_on {
                    let target = self.resolve(reference, &names).ok_or_else(|| {
                        ValidationError::UnknownDependency {
                            task: index,
                            reference: reference.to_string(),
                        }
                    })?;
                    if target >= index {
                        return Err(ValidationError::ForwardDependency {
                            task: index,
                            reference: reference.to_string(),
                        });
                    }
                    if !depends_on.contains(&target) {
                        depends_on.push(target);
                    }
                }

                Ok(PlannedTask {
                    index,
                    name: task
                        .name
                        .as_deref()
                        .map(str::trim)
                        .filter(|n| !n.is_empty())
                        .map(str::to_string),
                    session_type,
                    requirements,
                    context: task.context.clone(),
                    branch: task.branch.clone(),
                    depends_on,
                })
            })
            .collect()
    }

    fn resolve(&self, reference: &TaskRef, names: &HashMap<&str, usize>) -> Option<usize> {
        match reference {
            TaskRef::Index(index) => (*index < self.tasks.len()).then_some(*index),
            TaskRef::Name(name) => {
                let name = name.trim();
                names.get(name).copied().or_else(|| {
                    name.parse::<usize>()
                        .ok()
                        .filter(|index| *index < self.tasks.len())
                })
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GroupMember {
    pub index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_name: Option<String>,
    pub session_id: String,
}

/// Sessions created together. Membership is fixed once created; there is
/// no stored group status.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrchestrationGroup {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub description: String,
    pub repository: String,
    pub members: Vec<GroupMember>,
    pub created_at: DateTime<Utc>,
}

impl OrchestrationGroup {
    pub fn session_ids(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|m| m.session_id.as_str())
    }
}

/// Normalized reply to `orchestration.create`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrchestrationReceipt {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    pub sessions: Vec<Session>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MemberStatus {
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_name: Option<String>,
    /// `None` when the status query failed.
    pub status: Option<SessionStatus>,
    pub runnable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Failure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anomaly: Option<StatusAnomaly>,
}

/// Result of starting one member.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MemberStart {
    pub session_id: String,
    pub envelope: Envelope<StartAck>,
    /// Set when the ack contradicts a status already observed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anomaly: Option<StatusAnomaly>,
}

/// Aggregate view over a group's members. Never collapsed into a single
/// session status.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GroupStatus {
    pub name: String,
    pub members: Vec<MemberStatus>,
    pub counts: BTreeMap<String, usize>,
    pub all_complete: bool,
    pub any_failed: bool,
}

impl GroupStatus {
    pub fn from_members(name: impl Into<String>, members: Vec<MemberStatus>) -> Self {
        let mut counts = BTreeMap::new();
        for member in &members {
            let key = member
                .status
                .as_ref()
                .map(|s| s.as_str().to_string())
                .unwrap_or_else(|| "unreachable".to_string());
            *counts.entry(key).or_insert(0) += 1;
        }

        let all_complete = !members.is_empty()
            && members
                .iter()
                .all(|m| m.status == Some(SessionStatus::Completed));
        let any_failed = members
            .iter()
            .any(|m| m.status == Some(SessionStatus::Failed));

        Self {
            name: name.into(),
            members,
            counts,
            all_complete,
            any_failed,
        }
    }
}

#[derive(Error, Debug)]
pub enum GroupError {
    #[error(transparent)]
    Hub(#[from] HubError),

    /// A create failed partway; `created` lists the sessions that exist.
    #[error("group creation stopped{}: {failure}", .task.map(|t| format!(" at task {}", t)).unwrap_or_default())]
    Aborted {
        task: Option<usize>,
        failure: Failure,
        created: Vec<GroupMember>,
    },
}

impl From<ValidationError> for GroupError {
    fn from(err: ValidationError) -> Self {
        GroupError::Aborted {
            task: None,
            failure: err.into(),
            created: Vec::new(),
        }
    }
}
