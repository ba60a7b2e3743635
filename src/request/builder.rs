//! Validation and construction of outbound payloads.
//!
//! Everything here is synchronous and side-effect free: a request that
//! fails validation never reaches the transport.

use super::types::*;
use crate::error::ValidationError;
use crate::orchestration::GroupSpec;
use crate::session::{Project, SessionStatus, SessionType};
use tracing::debug;

const RESERVED_SESSION_KEYS: [&str; 3] = ["type", "project", "dependencies"];

pub fn validate_type(raw: &str) -> Result<SessionType, ValidationError> {
    raw.parse()
        .map_err(|_| ValidationError::InvalidType(raw.to_string()))
}

/// `owner/name`: exactly one separator, neither side blank.
pub fn validate_repository(raw: &str) -> Result<String, ValidationError> {
    let repository = raw.trim();
    let mut parts = repository.split('/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(owner), Some(name), None)
            if !owner.trim().is_empty() && !name.trim().is_empty() =>
        {
            Ok(repository.to_string())
        }
        _ => Err(ValidationError::InvalidRepository(raw.to_string())),
    }
}

pub fn validate_requirements(raw: &str) -> Result<String, ValidationError> {
    if raw.trim().is_empty() {
        return Err(ValidationError::EmptyRequirements);
    }
    Ok(raw.to_string())
}

/// Trim, drop blanks and the literal `none` (any case), drop duplicates.
pub fn sanitize_dependencies<S: AsRef<str>>(dependencies: &[S]) -> Vec<String> {
    let mut sanitized: Vec<String> = Vec::with_capacity(dependencies.len());
    for dep in dependencies {
        let dep = dep.as_ref().trim();
        if dep.is_empty() || dep.eq_ignore_ascii_case("none") {
            continue;
        }
        if !sanitized.iter().any(|existing| existing == dep) {
            sanitized.push(dep.to_string());
        }
    }
    sanitized
}

fn non_blank(value: Option<&String>) -> Option<String> {
    value
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn validate_session_id(session_id: &str) -> Result<String, ValidationError> {
    let session_id = session_id.trim();
    if session_id.is_empty() {
        return Err(ValidationError::EmptySessionId);
    }
    Ok(session_id.to_string())
}

/// Build a `session.create` payload. Checks run in order: type, repository,
/// requirements; the first failure is returned.
pub fn build_create(params: &CreateSessionParams) -> Result<Request, ValidationError> {
    let session_type = validate_type(&params.session_type)?;
    let repository = validate_repository(&params.repository)?;
    let requirements = validate_requirements(&params.requirements)?;

    let mut options = params.options.clone();
    for key in RESERVED_SESSION_KEYS {
        if options.remove(key).is_some() {
            debug!("Ignoring option '{}' that would shadow a session field", key);
        }
    }

    Ok(Request::CreateSession {
        session: SessionPayload {
            session_type,
            project: Project {
                repository,
                requirements,
                context: non_blank(params.context.as_ref()),
                branch: non_blank(params.branch.as_ref()),
            },
            dependencies: sanitize_dependencies(&params.dependencies),
            options,
        },
    })
}

pub fn build_start(session_id: &str) -> Result<Request, ValidationError> {
    Ok(Request::StartSession {
        session_id: validate_session_id(session_id)?,
    })
}

pub fn build_status_query(session_id: &str) -> Result<Request, ValidationError> {
    Ok(Request::GetSession {
        session_id: validate_session_id(session_id)?,
    })
}

pub fn build_output_query(session_id: &str) -> Result<Request, ValidationError> {
    Ok(Request::GetOutput {
        session_id: validate_session_id(session_id)?,
    })
}

/// `status_filter` of `None`, blank or `"all"` lists every session.
pub fn build_list(status_filter: Option<&str>, orchestration_id: Option<&str>) -> ListQuery {
    let status_filter = status_filter
        .map(str::trim)
        .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("all"))
        .map(SessionStatus::classify);

    let orchestration_id = orchestration_id
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string);

    ListQuery {
        request: Request::ListSessions { orchestration_id },
        status_filter,
    }
}

/// Build the single-shot `orchestration.create` payload. Sibling references
/// go out by task name, or by index for unnamed tasks.
pub fn build_orchestration(spec: &GroupSpec) -> Result<Request, ValidationError> {
    let plan = spec.plan()?;

    let tasks = plan
        .iter()
        .map(|task| TaskPayload {
            session_type: task.session_type,
            requirements: task.requirements.clone(),
            name: task.name.clone(),
            context: task.context.clone(),
            branch: task.branch.clone(),
            dependencies: task
                .depends_on
                .iter()
                .map(|&index| {
                    plan[index]
                        .name
                        .clone()
                        .unwrap_or_else(|| index.to_string())
                })
                .collect(),
        })
        .collect();

    Ok(Request::CreateOrchestration {
        orchestration: OrchestrationPayload {
            name: spec.name.trim().to_string(),
            description: spec.description.clone(),
            repository: validate_repository(&spec.repository)?,
            tasks,
        },
    })
}
