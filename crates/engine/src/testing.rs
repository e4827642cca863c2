//! Scripted in-memory gateway for engine tests.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use gateway::{ByteStream, Gateway, Operation};
use parking_lot::Mutex;
use serde_json::Value;
use shared::GatewayError;
use tokio::sync::{mpsc, oneshot};

pub(crate) enum Reply {
    Call(Result<Value, GatewayError>),
    /// Resolves when the test sends on the paired sender.
    DeferredCall(oneshot::Receiver<Result<Value, GatewayError>>),
    Stream(Vec<Result<Vec<u8>, GatewayError>>),
    /// Yields chunks as the test pushes them; ends when the sender drops.
    LiveStream(mpsc::UnboundedReceiver<Result<Vec<u8>, GatewayError>>),
    StreamRefused(GatewayError),
}

#[derive(Default)]
pub(crate) struct ScriptedGateway {
    replies: Mutex<VecDeque<Reply>>,
    calls: Mutex<Vec<(Operation, Value)>>,
}

impl ScriptedGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, reply: Reply) {
        self.replies.lock().push_back(reply);
    }

    pub fn calls(&self) -> Vec<(Operation, Value)> {
        self.calls.lock().clone()
    }

    fn next(&self, operation: Operation, payload: Value) -> Option<Reply> {
        self.calls.lock().push((operation, payload));
        self.replies.lock().pop_front()
    }
}

pub(crate) fn ok_chunks(parts: &[&str]) -> Reply {
    Reply::Stream(parts.iter().map(|p| Ok(p.as_bytes().to_vec())).collect())
}

pub(crate) fn content_frame(text: &str) -> String {
    format!("data: {}\n\n", serde_json::json!({ "content": text }))
}

pub(crate) fn error_frame(text: &str) -> String {
    format!("data: {}\n\n", serde_json::json!({ "error": text }))
}

#[async_trait]
impl Gateway for ScriptedGateway {
    async fn call(&self, operation: Operation, payload: Value) -> Result<Value, GatewayError> {
        match self.next(operation, payload) {
            Some(Reply::Call(result)) => result,
            Some(Reply::DeferredCall(rx)) => rx
                .await
                .unwrap_or_else(|_| Err(GatewayError::Transport("reply dropped".into()))),
            _ => Err(GatewayError::Transport("no scripted reply".into())),
        }
    }

    async fn stream(&self, operation: Operation, payload: Value) -> Result<ByteStream, GatewayError> {
        match self.next(operation, payload) {
            Some(Reply::Stream(parts)) => Ok(stream::iter(parts).boxed()),
            Some(Reply::LiveStream(rx)) => Ok(stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|item| (item, rx))
            })
            .boxed()),
            Some(Reply::StreamRefused(err)) => Err(err),
            _ => Err(GatewayError::Transport("no scripted stream".into())),
        }
    }
}
