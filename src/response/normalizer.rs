//! Collapses the response shapes the hub has produced over time into one
//! [`Envelope`].
//!
//! * flat: `{success, message, data, error}`
//! * webhook: `{message, event, handlerCount, results: [{success, data, error}]}`
//! * double-wrapped: `data.session.session`, `data.sessions.sessions`, ...
//!
//! Flat replies are rewritten into the webhook form first; everything after
//! that only looks at `results[0]`.

use super::types::Envelope;
use crate::error::Failure;
use serde_json::{json, Map, Value};

/// The entity an operation expects back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Session,
    SessionList,
    Output,
    Orchestration,
}

impl EntityKind {
    /// Key the entity lives under inside `data`.
    pub fn key(&self) -> &'static str {
        match self {
            EntityKind::Session => "session",
            EntityKind::SessionList => "sessions",
            EntityKind::Output => "output",
            EntityKind::Orchestration => "orchestration",
        }
    }
}

/// Rewrite a flat `{success, ...}` reply into the webhook form. Anything else
/// is returned unchanged.
pub fn to_webhook_shape(raw: &Value) -> Value {
    match raw.as_object() {
        Some(obj) if obj.contains_key("success") && !obj.contains_key("results") => {
            let success = obj.get("success").cloned().unwrap_or(Value::Bool(false));
            let (message, handler_count) = match success.as_bool() {
                Some(true) => ("Webhook processed", 1),
                _ => ("Webhook processing failed", 0),
            };
            json!({
                "message": message,
                "handlerCount": handler_count,
                "results": [{
                    "success": success,
                    "message": obj.get("message").cloned().unwrap_or(Value::Null),
                    "data": obj.get("data").cloned().unwrap_or(Value::Null),
                    "error": obj.get("error").cloned().unwrap_or(Value::Null),
                }]
            })
        }
        _ => raw.clone(),
    }
}

/// Normalize a decoded response body.
///
/// `requested_id` is the session an operation was addressed to; it is the
/// last fallback when the reply does not repeat the id.
pub fn normalize(raw: &Value, kind: EntityKind, requested_id: Option<&str>) -> Envelope {
    if !raw.is_object() {
        return Envelope::failure(Failure::malformed("response is not a JSON object"));
    }

    let webhook = to_webhook_shape(raw);
    let result = match webhook
        .get("results")
        .and_then(Value::as_array)
        .and_then(|results| results.first())
    {
        Some(Value::Object(result)) => result,
        Some(_) => return Envelope::failure(Failure::malformed("results[0] is not an object")),
        None => return Envelope::failure(Failure::malformed("response carries no results")),
    };

    if result.get("success").and_then(Value::as_bool) != Some(true) {
        let message = non_empty_str(result.get("error"))
            .or_else(|| non_empty_str(result.get("message")))
            .or_else(|| non_empty_str(webhook.get("message")))
            .unwrap_or("remote reported failure");
        return Envelope::failure(Failure::remote(message));
    }

    let data = result.get("data").unwrap_or(&Value::Null);
    let normalized = match kind {
        EntityKind::Session => normalize_session(data, requested_id),
        EntityKind::SessionList => normalize_list(data),
        EntityKind::Output => normalize_output(data, requested_id),
        EntityKind::Orchestration => normalize_orchestration(data),
    };
    normalized.into()
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Ids arrive as strings, and from some versions as numbers.
fn id_of(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Follow `key` while it leads to another mapping or sequence. Returns `None`
/// when `value` has no such key at all.
fn locate<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    let mut current = value.get(key).filter(|v| v.is_object() || v.is_array())?;
    while let Some(inner) = current.get(key).filter(|v| v.is_object() || v.is_array()) {
        current = inner;
    }
    Some(current)
}

/// Copy `keys` from `source` into `target` where `target` lacks them.
fn inherit(target: &mut Map<String, Value>, source: &Value, keys: &[&str]) {
    for key in keys {
        if target.contains_key(*key) {
            continue;
        }
        if let Some(value) = source.get(*key).filter(|v| !v.is_null()) {
            target.insert((*key).to_string(), value.clone());
        }
    }
}

/// Keys that mark a bare `data` object as describing a session.
const SESSION_FIELDS: [&str; 8] = [
    "status",
    "type",
    "project",
    "waitingFor",
    "dependencies",
    "containerId",
    "output",
    "error",
];

fn session_entity(data: &Value, requested_id: Option<&str>) -> Result<Value, Failure> {
    let located = locate(data, EntityKind::Session.key());
    let inner = located.unwrap_or(data);

    let reported = id_of(data.get("sessionId"))
        .or_else(|| id_of(data.get("id")))
        .or_else(|| id_of(inner.get("id")));

    // The requested id only names an entity the reply actually carries.
    let describes_session = located.is_some()
        || SESSION_FIELDS
            .iter()
            .any(|f| data.get(*f).is_some_and(|v| !v.is_null()));
    let id = match (reported, requested_id) {
        (Some(id), _) => id,
        (None, Some(id)) if describes_session => id.to_string(),
        _ => {
            return Err(Failure::missing_id(
                "no session id under sessionId, id or session.id",
            ))
        }
    };

    let mut entity = inner.as_object().cloned().unwrap_or_default();
    entity.remove("sessionId");
    entity.remove(EntityKind::Session.key());
    entity.insert("id".to_string(), Value::String(id));
    inherit(&mut entity, data, &["status", "waitingFor", "error"]);
    Ok(Value::Object(entity))
}

fn normalize_session(data: &Value, requested_id: Option<&str>) -> Result<Value, Failure> {
    session_entity(data, requested_id)
}

fn normalize_list(data: &Value) -> Result<Value, Failure> {
    let sessions = match data {
        Value::Array(_) => data,
        _ => locate(data, EntityKind::SessionList.key())
            .ok_or_else(|| Failure::missing_id("no sessions list in response"))?,
    };
    let Value::Array(items) = sessions else {
        return Err(Failure::malformed("sessions is not a list"));
    };

    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            session_entity(item, None).map_err(|e| {
                Failure::new(e.kind, format!("sessions[{}]: {}", index, e.message))
            })
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Value::Array)
}

fn normalize_output(data: &Value, requested_id: Option<&str>) -> Result<Value, Failure> {
    const OUTPUT_FIELDS: [&str; 5] = ["logs", "artifacts", "summary", "nextSteps", "filesCreated"];

    let output = match locate(data, EntityKind::Output.key()) {
        Some(output) => output,
        None if OUTPUT_FIELDS.iter().any(|f| data.get(*f).is_some()) => data,
        None => return Err(Failure::missing_id("no output in response")),
    };
    if !output.is_object() {
        return Err(Failure::malformed("output is not an object"));
    }

    let session_id = id_of(data.get("sessionId"))
        .or_else(|| id_of(data.get("id")))
        .or_else(|| requested_id.map(str::to_string))
        .ok_or_else(|| Failure::missing_id("no session id for output"))?;

    let mut entity = Map::new();
    entity.insert("sessionId".to_string(), Value::String(session_id));
    inherit(&mut entity, data, &["status"]);
    entity.insert("output".to_string(), output.clone());
    Ok(Value::Object(entity))
}

fn normalize_orchestration(data: &Value) -> Result<Value, Failure> {
    let orchestration = locate(data, EntityKind::Orchestration.key());

    let sessions = locate(data, EntityKind::SessionList.key())
        .or_else(|| orchestration.and_then(|o| locate(o, EntityKind::SessionList.key())))
        .ok_or_else(|| Failure::missing_id("no sessions in orchestration response"))?;

    let mut entity = Map::new();
    let id = id_of(data.get("orchestrationId"))
        .or_else(|| id_of(data.get("id")))
        .or_else(|| orchestration.and_then(|o| id_of(o.get("id"))));
    if let Some(id) = id {
        entity.insert("id".to_string(), Value::String(id));
    }
    if let Some(orchestration) = orchestration {
        inherit(&mut entity, orchestration, &["name", "status"]);
    }
    entity.insert("sessions".to_string(), normalize_list(sessions)?);
    Ok(Value::Object(entity))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;

    fn flat(data: Value) -> Value {
        json!({ "success": true, "message": "ok", "data": data, "error": null })
    }

    fn webhook(data: Value) -> Value {
        json!({
            "message": "Webhook processed",
            "event": "session.get",
            "handlerCount": 1,
            "results": [{ "success": true, "data": data }]
        })
    }

    #[test]
    fn test_shapes_normalize_identically() {
        let session = json!({ "id": "s-1", "status": "running", "type": "testing" });

        let a = normalize(&flat(json!({ "session": session })), EntityKind::Session, None);
        let b = normalize(&webhook(json!({ "session": session })), EntityKind::Session, None);
        let c = normalize(
            &flat(json!({ "session": { "session": session } })),
            EntityKind::Session,
            None,
        );
        let c_webhook = normalize(
            &webhook(json!({ "session": { "session": session } })),
            EntityKind::Session,
            None,
        );

        assert!(a.ok);
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(c, c_webhook);
        assert_eq!(a.entity.unwrap(), session);
    }

    #[test]
    fn test_create_reply_normalizes_to_id_and_status() {
        let raw = webhook(json!({ "session": { "id": "s-1", "status": "pending" } }));
        let envelope = normalize(&raw, EntityKind::Session, None);

        assert_eq!(
            envelope,
            Envelope::success(json!({ "id": "s-1", "status": "pending" }))
        );
    }

    #[test]
    fn test_flat_session_id_form_matches_nested_form() {
        let by_session_id = normalize(
            &webhook(json!({ "sessionId": "s-1", "status": "pending" })),
            EntityKind::Session,
            None,
        );
        let nested = normalize(
            &webhook(json!({ "session": { "id": "s-1", "status": "pending" } })),
            EntityKind::Session,
            None,
        );
        assert_eq!(by_session_id, nested);
    }

    #[test]
    fn test_id_lookup_order() {
        let raw = webhook(json!({
            "sessionId": "from-session-id",
            "id": "from-id",
            "session": { "id": "from-session" }
        }));
        let entity = normalize(&raw, EntityKind::Session, None).entity.unwrap();
        assert_eq!(entity["id"], "from-session-id");

        let raw = webhook(json!({ "id": "from-id", "session": { "id": "from-session" } }));
        let entity = normalize(&raw, EntityKind::Session, None).entity.unwrap();
        assert_eq!(entity["id"], "from-id");

        let raw = webhook(json!({ "sessionId": "", "session": { "id": "from-session" } }));
        let entity = normalize(&raw, EntityKind::Session, None).entity.unwrap();
        assert_eq!(entity["id"], "from-session");
    }

    #[test]
    fn test_success_without_id_is_missing_entity() {
        let envelope = normalize(&flat(json!({ "status": "pending" })), EntityKind::Session, None);
        assert!(!envelope.ok);
        assert!(envelope.entity.is_none());
        assert_eq!(envelope.error.unwrap().kind, FailureKind::MissingEntityId);
    }

    #[test]
    fn test_requested_id_is_last_fallback() {
        let raw = webhook(json!({ "status": "queued", "waitingFor": ["s-0"] }));
        let entity = normalize(&raw, EntityKind::Session, Some("s-1")).entity.unwrap();
        assert_eq!(
            entity,
            json!({ "id": "s-1", "status": "queued", "waitingFor": ["s-0"] })
        );
    }

    #[test]
    fn test_empty_data_is_missing_entity_even_with_requested_id() {
        for data in [json!({}), Value::Null, json!({ "message": "ok" })] {
            let envelope = normalize(&webhook(data.clone()), EntityKind::Session, Some("s-1"));
            assert!(!envelope.ok, "data {} should not normalize", data);
            assert!(envelope.entity.is_none());
            assert_eq!(envelope.error.unwrap().kind, FailureKind::MissingEntityId);
        }

        let wrapped = normalize(&webhook(json!({ "session": {} })), EntityKind::Session, Some("s-1"));
        assert_eq!(wrapped.entity, Some(json!({ "id": "s-1" })));
    }

    #[test]
    fn test_non_object_is_malformed() {
        for raw in [json!("ok"), json!([1, 2]), Value::Null] {
            let envelope = normalize(&raw, EntityKind::Session, None);
            assert_eq!(envelope.error.unwrap().kind, FailureKind::MalformedResponse);
        }
    }

    #[test]
    fn test_missing_or_bad_first_result_is_malformed() {
        let envelope = normalize(&json!({ "results": [] }), EntityKind::Session, None);
        assert_eq!(envelope.error.unwrap().kind, FailureKind::MalformedResponse);

        let envelope = normalize(&json!({ "results": ["nope"] }), EntityKind::Session, None);
        assert_eq!(envelope.error.unwrap().kind, FailureKind::MalformedResponse);
    }

    #[test]
    fn test_remote_failure_carries_message() {
        let raw = json!({ "success": false, "error": "Session not found" });
        let envelope = normalize(&raw, EntityKind::Session, Some("s-1"));
        assert_eq!(envelope.error, Some(Failure::remote("Session not found")));

        let raw = json!({ "results": [{ "success": false }], "message": "Webhook processing failed" });
        let envelope = normalize(&raw, EntityKind::Session, None);
        assert_eq!(envelope.error, Some(Failure::remote("Webhook processing failed")));
    }

    #[test]
    fn test_flat_reply_is_rewritten_to_webhook_form() {
        let rewritten = to_webhook_shape(&flat(json!({ "sessionId": "s-1" })));
        assert_eq!(rewritten["handlerCount"], 1);
        assert_eq!(rewritten["results"][0]["success"], true);
        assert_eq!(rewritten["results"][0]["data"]["sessionId"], "s-1");

        let untouched = webhook(json!({}));
        assert_eq!(to_webhook_shape(&untouched), untouched);
    }

    #[test]
    fn test_list_normalization() {
        let raw = webhook(json!({
            "sessions": [
                { "id": "s-1", "status": "running" },
                { "session": { "id": "s-2", "status": "completed" } }
            ]
        }));
        let entity = normalize(&raw, EntityKind::SessionList, None).entity.unwrap();
        assert_eq!(
            entity,
            json!([
                { "id": "s-1", "status": "running" },
                { "id": "s-2", "status": "completed" }
            ])
        );

        let wrapped = flat(json!({ "sessions": { "sessions": [{ "id": "s-1", "status": "running" }] } }));
        let entity = normalize(&wrapped, EntityKind::SessionList, None).entity.unwrap();
        assert_eq!(entity, json!([{ "id": "s-1", "status": "running" }]));
    }

    #[test]
    fn test_list_entry_without_id_fails() {
        let raw = webhook(json!({ "sessions": [{ "status": "running" }] }));
        let error = normalize(&raw, EntityKind::SessionList, None).error.unwrap();
        assert_eq!(error.kind, FailureKind::MissingEntityId);
        assert!(error.message.starts_with("sessions[0]"));
    }

    #[test]
    fn test_output_normalization() {
        let raw = webhook(json!({
            "sessionId": "s-1",
            "status": "completed",
            "output": { "summary": "done", "artifacts": ["pr#1"] }
        }));
        let entity = normalize(&raw, EntityKind::Output, Some("s-1")).entity.unwrap();
        assert_eq!(
            entity,
            json!({
                "sessionId": "s-1",
                "status": "completed",
                "output": { "summary": "done", "artifacts": ["pr#1"] }
            })
        );

        let missing = normalize(&webhook(json!({ "sessionId": "s-1" })), EntityKind::Output, Some("s-1"));
        assert_eq!(missing.error.unwrap().kind, FailureKind::MissingEntityId);
    }

    #[test]
    fn test_orchestration_normalization() {
        let raw = webhook(json!({
            "orchestration": { "id": "orch-1", "name": "todo app" },
            "sessions": [{ "id": "s-1", "status": "pending" }, { "id": "s-2", "status": "pending" }]
        }));
        let entity = normalize(&raw, EntityKind::Orchestration, None).entity.unwrap();
        assert_eq!(entity["id"], "orch-1");
        assert_eq!(entity["name"], "todo app");
        assert_eq!(entity["sessions"].as_array().unwrap().len(), 2);
    }
}
