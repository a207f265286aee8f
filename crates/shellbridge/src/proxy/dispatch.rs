//! Request dispatch.
//!
//! Maps a decoded method and its params onto session manager operations and
//! serializes the result. Shared by the proxy server and the embedded driver.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use shellbridge_protocol::{
    Ack, ContentResult, GetContentParams, Method, ProtocolError, RecordingStatus, SendKeyParams,
    StartRecordingParams, TypeParams,
};
use thiserror::Error;

use crate::session::{RecordingSummary, SessionError, SessionManager};

/// Why a request could not be answered with a result.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Answers one request.
#[async_trait]
pub trait RequestHandler: Send + Sync + 'static {
    async fn handle(&self, method: Method, params: Value) -> Result<Value, DispatchError>;
}

/// Serves the tool methods from the session manager.
pub struct SessionToolHandler {
    manager: Arc<SessionManager>,
}

impl SessionToolHandler {
    pub fn new(manager: Arc<SessionManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl RequestHandler for SessionToolHandler {
    async fn handle(&self, method: Method, params: Value) -> Result<Value, DispatchError> {
        tracing::debug!(method = %method, "Dispatching request");
        match method {
            Method::Type => {
                let params: TypeParams = method.parse_params(params)?;
                self.manager.type_text(&params.text, params.submit).await?;
                to_value(Ack::OK)
            }
            Method::SendKey => {
                let params: SendKeyParams = method.parse_params(params)?;
                self.manager.send_key(&params.key).await?;
                to_value(Ack::OK)
            }
            Method::GetContent => {
                let params: GetContentParams = method.parse_params(params)?;
                let content = self.manager.content(params.visible_only).await?;
                to_value(ContentResult { content })
            }
            Method::TakeScreenshot => to_value(self.manager.screenshot().await?),
            Method::StartRecording => {
                let params: StartRecordingParams = method.parse_params(params)?;
                let summary = self
                    .manager
                    .start_recording(params.path.map(PathBuf::from))
                    .await?;
                to_value(recording_status(true, summary))
            }
            Method::StopRecording => {
                let summary = self.manager.stop_recording().await?;
                to_value(recording_status(false, summary))
            }
        }
    }
}

/// Decode a method name and dispatch it.
pub async fn dispatch(
    handler: &dyn RequestHandler,
    method: &str,
    params: Value,
) -> Result<Value, DispatchError> {
    let method: Method = method.parse()?;
    handler.handle(method, params).await
}

fn recording_status(recording: bool, summary: RecordingSummary) -> RecordingStatus {
    RecordingStatus {
        recording,
        path: summary.path.map(|p| p.to_string_lossy().into_owned()),
        bytes: summary.bytes,
    }
}

fn to_value<T: Serialize>(value: T) -> Result<Value, DispatchError> {
    serde_json::to_value(value)
        .map_err(|e| DispatchError::Protocol(ProtocolError::Serialization(e.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionOptions;
    use serde_json::json;
    use std::time::Duration;

    fn handler_without_session() -> SessionToolHandler {
        SessionToolHandler::new(Arc::new(SessionManager::new(std::env::temp_dir())))
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let handler = handler_without_session();
        let err = dispatch(&handler, "frobnicate", Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Protocol(ProtocolError::UnknownMethod(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_params() {
        let handler = handler_without_session();
        let err = dispatch(&handler, "type", json!({"text": 5})).await.unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Protocol(ProtocolError::InvalidParams { .. })
        ));
    }

    #[tokio::test]
    async fn test_no_session_is_surfaced() {
        let handler = handler_without_session();
        let err = dispatch(&handler, "takeScreenshot", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Session(SessionError::NoSession)));
    }

    #[tokio::test]
    async fn test_type_then_get_content() {
        let manager = Arc::new(SessionManager::new(std::env::temp_dir()));
        manager
            .init_session(SessionOptions {
                shell: Some("/bin/sh".to_string()),
                shell_integration: false,
                ..SessionOptions::default()
            })
            .await
            .unwrap();
        let handler = SessionToolHandler::new(Arc::clone(&manager));

        let ack = dispatch(
            &handler,
            "type",
            json!({"text": "echo via_$((2+3))", "submit": true}),
        )
        .await
        .unwrap();
        assert_eq!(ack, json!({"ok": true}));

        let mut found = false;
        for _ in 0..100 {
            let result = dispatch(&handler, "getContent", json!({"visibleOnly": true}))
                .await
                .unwrap();
            if result["content"].as_str().unwrap().contains("via_5") {
                found = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(found);

        let shot = dispatch(&handler, "takeScreenshot", Value::Null)
            .await
            .unwrap();
        assert_eq!(shot["cols"], 80);
        assert_eq!(shot["rows"], 24);

        manager.dispose_async().await;
    }
}
