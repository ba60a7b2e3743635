use crate::error::Failure;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// The one response shape propagated past the normalizer.
///
/// An `ok` envelope always has an entity; a failed one always has an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope<T = Value> {
    pub ok: bool,
    pub entity: Option<T>,
    pub error: Option<Failure>,
}

impl<T> Envelope<T> {
    pub fn success(entity: T) -> Self {
        Self {
            ok: true,
            entity: Some(entity),
            error: None,
        }
    }

    pub fn failure(error: impl Into<Failure>) -> Self {
        Self {
            ok: false,
            entity: None,
            error: Some(error.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.ok
    }

    pub fn entity(&self) -> Option<&T> {
        self.entity.as_ref()
    }

    pub fn error(&self) -> Option<&Failure> {
        self.error.as_ref()
    }

    pub fn into_result(self) -> Result<T, Failure> {
        match (self.ok, self.entity, self.error) {
            (true, Some(entity), _) => Ok(entity),
            (_, _, Some(error)) => Err(error),
            _ => Err(Failure::missing_id("envelope carried no entity")),
        }
    }

    pub fn map<U, F>(self, f: F) -> Envelope<U>
    where
        F: FnOnce(T) -> U,
    {
        match self.into_result() {
            Ok(entity) => Envelope::success(f(entity)),
            Err(error) => Envelope::failure(error),
        }
    }

    pub fn and_then<U, F>(self, f: F) -> Envelope<U>
    where
        F: FnOnce(T) -> Result<U, Failure>,
    {
        match self.into_result().and_then(f) {
            Ok(entity) => Envelope::success(entity),
            Err(error) => Envelope::failure(error),
        }
    }
}

impl Envelope<Value> {
    /// Deserialize the normalized entity into a typed model.
    pub fn decode<U: DeserializeOwned>(self) -> Envelope<U> {
        self.and_then(|entity| {
            serde_json::from_value(entity)
                .map_err(|e| Failure::malformed(format!("unexpected entity layout: {}", e)))
        })
    }
}

impl<T> From<Result<T, Failure>> for Envelope<T> {
    fn from(result: Result<T, Failure>) -> Self {
        match result {
            Ok(entity) => Envelope::success(entity),
            Err(error) => Envelope::failure(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use serde_json::json;

    #[test]
    fn test_decode_failure_is_malformed() {
        #[derive(Debug, serde::Deserialize)]
        struct NeedsId {
            #[allow(dead_code)]
            id: String,
        }

        let envelope = Envelope::success(json!({ "status": "running" })).decode::<NeedsId>();
        assert!(!envelope.ok);
        assert_eq!(
            envelope.error.unwrap().kind,
            FailureKind::MalformedResponse
        );
    }

    #[test]
    fn test_failure_passes_through_map() {
        let envelope: Envelope<Value> = Envelope::failure(Failure::remote("Session not found"));
        let mapped = envelope.map(|v| v.to_string());
        assert_eq!(mapped.into_result(), Err(Failure::remote("Session not found")));
    }
}
