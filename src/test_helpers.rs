#[cfg(test)]
pub mod mocks {
    use crate::transport::{Transport, TransportError, TransportResponse};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// One scripted answer to a request.
    #[derive(Debug, Clone)]
    pub enum Reply {
        Respond(TransportResponse),
        Fail(TransportError),
        /// Never answers; only cancellation or a timeout gets past it.
        Hang,
    }

    impl Reply {
        pub fn ok(body: Value) -> Self {
            Reply::Respond(TransportResponse {
                status: 200,
                body: Some(body),
            })
        }

        pub fn status(status: u16, body: Option<Value>) -> Self {
            Reply::Respond(TransportResponse { status, body })
        }

        pub fn network_error(message: &str) -> Self {
            Reply::Fail(TransportError::Request(message.to_string()))
        }
    }

    /// Webhook-shaped success carrying `data`.
    pub fn webhook_ok(data: Value) -> Reply {
        Reply::ok(json!({
            "message": "Webhook processed",
            "handlerCount": 1,
            "results": [{ "success": true, "data": data }]
        }))
    }

    /// Flat-shaped success carrying `data`.
    pub fn flat_ok(data: Value) -> Reply {
        Reply::ok(json!({ "success": true, "message": "ok", "data": data }))
    }

    pub fn remote_failure(error: &str) -> Reply {
        Reply::ok(json!({ "success": false, "error": error }))
    }

    pub fn session_status(id: &str, status: &str) -> Reply {
        webhook_ok(json!({ "session": { "id": id, "status": status } }))
    }

    #[derive(Debug, Clone)]
    pub struct RecordedRequest {
        pub url: String,
        pub body: Value,
        pub headers: Vec<(String, String)>,
        pub at: Instant,
    }

    impl RecordedRequest {
        pub fn kind(&self) -> &str {
            self.body["type"].as_str().unwrap_or_default()
        }

        pub fn session_id(&self) -> Option<&str> {
            self.body["sessionId"].as_str()
        }
    }

    type ScriptKey = (String, Option<String>);

    /// In-memory transport that answers by request `type` (and optionally
    /// `sessionId`). Each key holds a queue of replies; the last one repeats.
    #[derive(Default)]
    pub struct ScriptedTransport {
        scripts: Mutex<HashMap<ScriptKey, VecDeque<Reply>>>,
        requests: Mutex<Vec<RecordedRequest>>,
    }

    impl ScriptedTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn on(self, kind: &str, reply: Reply) -> Self {
            self.push((kind.to_string(), None), reply);
            self
        }

        pub fn on_session(self, kind: &str, session_id: &str, reply: Reply) -> Self {
            self.push((kind.to_string(), Some(session_id.to_string())), reply);
            self
        }

        fn push(&self, key: ScriptKey, reply: Reply) {
            self.scripts
                .lock()
                .unwrap()
                .entry(key)
                .or_default()
                .push_back(reply);
        }

        pub fn requests(&self) -> Vec<RecordedRequest> {
            self.requests.lock().unwrap().clone()
        }

        pub fn requests_of(&self, kind: &str) -> Vec<RecordedRequest> {
            self.requests()
                .into_iter()
                .filter(|r| r.kind() == kind)
                .collect()
        }

        fn next_reply(&self, kind: &str, session_id: Option<&str>) -> Reply {
            let mut scripts = self.scripts.lock().unwrap();
            let exact = session_id.map(|id| (kind.to_string(), Some(id.to_string())));
            let key = exact
                .filter(|k| scripts.contains_key(k))
                .unwrap_or_else(|| (kind.to_string(), None));

            match scripts.get_mut(&key) {
                Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
                Some(queue) if !queue.is_empty() => queue[0].clone(),
                _ => remote_failure(&format!("no script for {}", kind)),
            }
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn post(
            &self,
            url: &str,
            body: &Value,
            headers: &[(String, String)],
        ) -> Result<TransportResponse, TransportError> {
            let recorded = RecordedRequest {
                url: url.to_string(),
                body: body.clone(),
                headers: headers.to_vec(),
                at: Instant::now(),
            };
            let reply = self.next_reply(recorded.kind(), recorded.session_id());
            self.requests.lock().unwrap().push(recorded);

            match reply {
                Reply::Respond(response) => Ok(response),
                Reply::Fail(error) => Err(error),
                Reply::Hang => std::future::pending().await,
            }
        }
    }
}
