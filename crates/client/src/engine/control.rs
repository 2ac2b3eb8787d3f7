//! Control channel to a running engine.
//!
//! Callers never touch the engine's rule list or lifecycle directly; they send
//! a [`ControlMessage`] through an [`EngineHandle`] and await the reply.

use std::sync::Weak;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use super::CacheEngine;
use super::lifecycle::LifecycleState;
use intercache_core::{Error, RuleSpec};

/// Messages accepted by a running engine.
///
/// Wire form: `{"type": "ADD_CACHE_RULE", "rule": {...}}`, `{"type": "SKIP_WAITING"}`,
/// `{"type": "GET_VERSION"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMessage {
    AddCacheRule { rule: RuleSpec },
    SkipWaiting,
    GetVersion,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlReply {
    /// Position of the appended rule.
    RuleAdded { index: usize },
    /// Lifecycle state after the skip-wait request was applied.
    SkipWaiting { state: LifecycleState },
    Version { version: String },
}

pub(super) struct Envelope {
    message: ControlMessage,
    reply: oneshot::Sender<Result<ControlReply, Error>>,
}

/// Cloneable sender side of an engine's control channel.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<Envelope>,
}

impl std::fmt::Debug for Envelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Envelope").field("message", &self.message).finish()
    }
}

impl EngineHandle {
    pub(super) fn new(tx: mpsc::Sender<Envelope>) -> Self {
        Self { tx }
    }

    /// Deliver `message` and wait for the engine's reply.
    ///
    /// Fails with `Error::EngineClosed` once the engine has been dropped.
    pub async fn send(&self, message: ControlMessage) -> Result<ControlReply, Error> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Envelope { message, reply })
            .await
            .map_err(|_| Error::EngineClosed)?;
        rx.await.map_err(|_| Error::EngineClosed)?
    }
}

/// Serve control messages until the channel closes or the engine is gone.
pub(super) async fn run(engine: Weak<CacheEngine>, mut rx: mpsc::Receiver<Envelope>) {
    while let Some(Envelope { message, reply }) = rx.recv().await {
        let Some(engine) = engine.upgrade() else {
            let _ = reply.send(Err(Error::EngineClosed));
            break;
        };

        tracing::debug!(?message, version = %engine.version(), "control message");
        let result = match message {
            ControlMessage::AddCacheRule { rule } => {
                engine.add_rule(rule).await.map(|index| ControlReply::RuleAdded { index })
            }
            ControlMessage::SkipWaiting => engine
                .skip_waiting()
                .await
                .map(|state| ControlReply::SkipWaiting { state }),
            ControlMessage::GetVersion => Ok(ControlReply::Version { version: engine.version().to_string() }),
        };
        // Drop the strong reference before waiting for the next message.
        drop(engine);

        if reply.send(result).is_err() {
            tracing::debug!("control caller went away before the reply");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format() {
        let message: ControlMessage = serde_json::from_str(
            r#"{"type":"ADD_CACHE_RULE","rule":{"pattern":"\\.svg$","strategy":"cache-first","partition":"images","maxAge":60}}"#,
        )
        .unwrap();
        match message {
            ControlMessage::AddCacheRule { rule } => {
                assert_eq!(rule.partition, "images");
                assert_eq!(rule.max_age, Some(60));
            }
            other => panic!("unexpected message {other:?}"),
        }

        let skip: ControlMessage = serde_json::from_str(r#"{"type":"SKIP_WAITING"}"#).unwrap();
        assert_eq!(skip, ControlMessage::SkipWaiting);

        let json = serde_json::to_value(ControlMessage::GetVersion).unwrap();
        assert_eq!(json, serde_json::json!({"type": "GET_VERSION"}));
    }

    #[test]
    fn test_reply_wire_format() {
        let json = serde_json::to_value(ControlReply::Version { version: "v2".into() }).unwrap();
        assert_eq!(json, serde_json::json!({"type": "VERSION", "version": "v2"}));
    }

    #[tokio::test]
    async fn test_send_to_closed_channel() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let handle = EngineHandle::new(tx);
        let result = handle.send(ControlMessage::GetVersion).await;
        assert!(matches!(result, Err(Error::EngineClosed)));
    }
}
