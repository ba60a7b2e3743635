use crate::session::{Project, SessionStatus, SessionType};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Outbound webhook payload, discriminated by `type`.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type")]
pub enum Request {
    #[serde(rename = "session.create")]
    CreateSession { session: SessionPayload },

    #[serde(rename = "session.start")]
    StartSession {
        #[serde(rename = "sessionId")]
        session_id: String,
    },

    #[serde(rename = "session.get")]
    GetSession {
        #[serde(rename = "sessionId")]
        session_id: String,
    },

    #[serde(rename = "session.output")]
    GetOutput {
        #[serde(rename = "sessionId")]
        session_id: String,
    },

    #[serde(rename = "session.list")]
    ListSessions {
        #[serde(rename = "orchestrationId", skip_serializing_if = "Option::is_none")]
        orchestration_id: Option<String>,
    },

    #[serde(rename = "orchestration.create")]
    CreateOrchestration { orchestration: OrchestrationPayload },
}

impl Request {
    /// Value of the `type` discriminator on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Request::CreateSession { .. } => "session.create",
            Request::StartSession { .. } => "session.start",
            Request::GetSession { .. } => "session.get",
            Request::GetOutput { .. } => "session.output",
            Request::ListSessions { .. } => "session.list",
            Request::CreateOrchestration { .. } => "orchestration.create",
        }
    }

    /// The session a request is addressed to, when there is one.
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Request::StartSession { session_id }
            | Request::GetSession { session_id }
            | Request::GetOutput { session_id } => Some(session_id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SessionPayload {
    #[serde(rename = "type")]
    pub session_type: SessionType,
    pub project: Project,
    pub dependencies: Vec<String>,
    #[serde(flatten)]
    pub options: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OrchestrationPayload {
    pub name: String,
    pub description: String,
    pub repository: String,
    pub tasks: Vec<TaskPayload>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TaskPayload {
    #[serde(rename = "type")]
    pub session_type: SessionType,
    pub requirements: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    pub dependencies: Vec<String>,
}

/// Caller-supplied parameters for `session.create`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionParams {
    #[serde(rename = "type")]
    pub session_type: String,
    pub repository: String,
    pub requirements: String,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub options: Map<String, Value>,
}

impl CreateSessionParams {
    pub fn new(
        session_type: impl Into<String>,
        repository: impl Into<String>,
        requirements: impl Into<String>,
    ) -> Self {
        Self {
            session_type: session_type.into(),
            repository: repository.into(),
            requirements: requirements.into(),
            ..Default::default()
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }
}

/// A `session.list` request plus the status filter applied to its reply.
#[derive(Debug, Clone, PartialEq)]
pub struct ListQuery {
    pub request: Request,
    pub status_filter: Option<SessionStatus>,
}
