//! Assistant chat whose replies stream in frame by frame.
//!
//! `send` spawns a background task that opens the chat stream and forwards
//! decoded frames over a channel. The session applies them to its transcript
//! in `poll` / `next_update` / `settle`, so the transcript is only ever
//! mutated from the owner's side.

use std::sync::Arc;

use futures::future::{AbortHandle, Abortable};
use futures::StreamExt;
use gateway::{Gateway, Operation, StreamFrame};
use serde_json::{json, Value};
use shared::settings::ClientSettings;
use shared::GatewayError;
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};

use crate::transcript::{ChatRole, Transcript};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SendRejected {
    #[error("message is empty")]
    Empty,
    #[error("a reply is still streaming")]
    InFlight,
}

/// Visible effect of one applied stream event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatUpdate {
    /// Text appended to the streaming reply.
    Delta(String),
    /// The reply failed and now holds the apology. Carries the cause.
    Failed(String),
    Completed,
}

#[derive(Debug)]
enum ChatEvent {
    Frame(StreamFrame),
    Failed(GatewayError),
    Finished,
}

struct InFlight {
    rx: UnboundedReceiver<ChatEvent>,
    abort: AbortHandle,
}

pub struct ChatSession {
    gateway: Arc<dyn Gateway>,
    transcript: Transcript,
    apology: String,
    in_flight: Option<InFlight>,
}

impl ChatSession {
    pub fn new(gateway: Arc<dyn Gateway>, apology: impl Into<String>) -> Self {
        Self {
            gateway,
            transcript: Transcript::new(),
            apology: apology.into(),
            in_flight: None,
        }
    }

    pub fn from_settings(gateway: Arc<dyn Gateway>, settings: &ClientSettings) -> Self {
        Self::new(gateway, settings.chat_apology.clone()).with_greeting(&settings.chat_greeting)
    }

    /// Seed the transcript with an assistant greeting. Blank greetings are
    /// ignored.
    pub fn with_greeting(mut self, greeting: &str) -> Self {
        if !greeting.trim().is_empty() && self.transcript.is_empty() {
            self.transcript.push_closed(ChatRole::Assistant, greeting.trim());
        }
        self
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Start a new turn. Must be called inside a Tokio runtime.
    ///
    /// On acceptance the user message and an empty streaming assistant
    /// message are appended before this returns.
    pub fn send(&mut self, text: &str) -> Result<(), SendRejected> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SendRejected::Empty);
        }
        if self.in_flight.is_some() {
            tracing::debug!("chat send rejected, reply still streaming");
            return Err(SendRejected::InFlight);
        }

        self.transcript.push_closed(ChatRole::User, text);
        self.transcript.open_assistant();

        let (tx, rx) = mpsc::unbounded_channel();
        let (abort, registration) = AbortHandle::new_pair();
        let payload = json!({ "message": text });
        tokio::spawn(Abortable::new(
            stream_reply(self.gateway.clone(), payload, tx),
            registration,
        ));
        self.in_flight = Some(InFlight { rx, abort });

        tracing::info!(chars = text.chars().count(), "chat message sent");
        Ok(())
    }

    /// Apply every update that has already arrived, without waiting.
    pub fn poll(&mut self) -> Vec<ChatUpdate> {
        let mut updates = Vec::new();
        while let Some(in_flight) = self.in_flight.as_mut() {
            let event = match in_flight.rx.try_recv() {
                Ok(event) => Some(event),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => None,
            };
            updates.push(self.apply(event));
        }
        updates
    }

    /// Wait for the next update of the in-flight reply. `None` when nothing is
    /// in flight.
    pub async fn next_update(&mut self) -> Option<ChatUpdate> {
        let in_flight = self.in_flight.as_mut()?;
        let event = in_flight.rx.recv().await;
        Some(self.apply(event))
    }

    /// Wait until the in-flight reply completes or fails.
    pub async fn settle(&mut self) {
        while self.next_update().await.is_some() {}
    }

    /// Stop the in-flight reply, keeping what has been applied so far.
    /// Returns false if nothing was in flight.
    pub fn cancel(&mut self) -> bool {
        let Some(in_flight) = self.in_flight.take() else {
            return false;
        };
        in_flight.abort.abort();
        self.transcript.close_open();
        tracing::info!("chat reply cancelled");
        true
    }

    /// Drop the whole conversation, cancelling any in-flight reply.
    pub fn clear(&mut self) {
        self.cancel();
        self.transcript.clear();
    }

    /// `None` means the background task went away without a final event.
    fn apply(&mut self, event: Option<ChatEvent>) -> ChatUpdate {
        match event {
            Some(ChatEvent::Frame(StreamFrame::Content(text))) => {
                self.transcript.append_open(&text);
                ChatUpdate::Delta(text)
            }
            Some(ChatEvent::Frame(StreamFrame::Error(message))) => self.fail(message),
            Some(ChatEvent::Frame(StreamFrame::Malformed(detail))) => {
                self.fail(format!("malformed reply frame: {detail}"))
            }
            Some(ChatEvent::Failed(err)) => self.fail(err.to_string()),
            Some(ChatEvent::Finished) => {
                self.transcript.close_open();
                self.in_flight = None;
                tracing::debug!("chat reply completed");
                ChatUpdate::Completed
            }
            None => self.fail("stream task ended unexpectedly".to_string()),
        }
    }

    fn fail(&mut self, reason: String) -> ChatUpdate {
        tracing::warn!(%reason, "chat reply failed");
        self.transcript.replace_open(&self.apology);
        self.transcript.close_open();
        if let Some(in_flight) = self.in_flight.take() {
            in_flight.abort.abort();
        }
        ChatUpdate::Failed(reason)
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        if let Some(in_flight) = self.in_flight.take() {
            in_flight.abort.abort();
        }
    }
}

async fn stream_reply(gateway: Arc<dyn Gateway>, payload: Value, tx: UnboundedSender<ChatEvent>) {
    let source = match gateway.stream(Operation::Chat, payload).await {
        Ok(source) => source,
        Err(e) => {
            let _ = tx.send(ChatEvent::Failed(e));
            return;
        }
    };

    let mut frames = gateway::frames(source);
    while let Some(item) = frames.next().await {
        let (event, last) = match item {
            Ok(frame) => {
                let last = frame.is_terminal();
                (ChatEvent::Frame(frame), last)
            }
            Err(e) => (ChatEvent::Failed(e), true),
        };
        if tx.send(event).is_err() {
            tracing::debug!("chat session gone, releasing stream");
            return;
        }
        if last {
            return;
        }
    }
    let _ = tx.send(ChatEvent::Finished);
}
