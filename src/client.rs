//! The ledger client seam: connection sufficiency and reply lookup by
//! request key, as consumed by the correlator.

use std::path::PathBuf;

use serde_json::Value;

use crate::wallet::sanitize_component;

pub type Reply = Value;

/// State of one submitted request as observed by the client.
#[derive(Debug, Clone)]
pub enum RequestStatus {
    Pending,
    Replied(Reply),
    Failed(String),
}

pub trait Client: Send + Sync {
    fn has_sufficient_connections(&self) -> bool;
    fn status_of(&self, request_key: &str) -> RequestStatus;
}

/// File-backed reply log: one JSON file per request key under a replies
/// directory, `{"result": ...}` for success or `{"error": "..."}` for
/// failure. The local agent writes these; tests may place them directly.
#[derive(Debug, Clone)]
pub struct ReplyDir {
    root: PathBuf,
}

impl ReplyDir {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn path_for(&self, request_key: &str) -> PathBuf {
        self.root
            .join(format!("{}.json", sanitize_component(request_key)))
    }
}

impl Client for ReplyDir {
    fn has_sufficient_connections(&self) -> bool {
        // A file-backed reply log is always reachable.
        true
    }

    fn status_of(&self, request_key: &str) -> RequestStatus {
        let path = self.path_for(request_key);
        let Ok(data) = std::fs::read(&path) else {
            return RequestStatus::Pending;
        };
        let Ok(value) = serde_json::from_slice::<Value>(&data) else {
            return RequestStatus::Failed(format!(
                "reply for '{request_key}' is not valid json"
            ));
        };
        if let Some(err) = value.get("error").and_then(Value::as_str) {
            return RequestStatus::Failed(err.to_string());
        }
        match value.get("result") {
            Some(result) => RequestStatus::Replied(result.clone()),
            None => RequestStatus::Failed(format!(
                "reply for '{request_key}' carries neither result nor error"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_reply_is_pending() {
        let temp = tempfile::tempdir().unwrap();
        let replies = ReplyDir::new(temp.path().to_path_buf());
        assert!(matches!(replies.status_of("req-1"), RequestStatus::Pending));
    }

    #[test]
    fn result_and_error_files_are_classified() {
        let temp = tempfile::tempdir().unwrap();
        let replies = ReplyDir::new(temp.path().to_path_buf());

        std::fs::write(
            replies.path_for("req-ok"),
            serde_json::json!({"result": {"status": "accepted"}}).to_string(),
        )
        .unwrap();
        match replies.status_of("req-ok") {
            RequestStatus::Replied(reply) => {
                assert_eq!(reply["status"], "accepted");
            }
            other => panic!("expected reply, got {other:?}"),
        }

        std::fs::write(
            replies.path_for("req-bad"),
            serde_json::json!({"error": "claim not available"}).to_string(),
        )
        .unwrap();
        match replies.status_of("req-bad") {
            RequestStatus::Failed(err) => assert_eq!(err, "claim not available"),
            other => panic!("expected failure, got {other:?}"),
        }
    }
}
