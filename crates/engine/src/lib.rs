//! DopamineExp client engine
//!
//! This crate holds the client-side state machines:
//! - `ChatSession`: assistant chat with streamed replies
//! - `AnalyzerWorkflow`: URL → details → prediction wizard
//! - `LoginFlow`: email one-time-code login

pub mod auth;
pub mod chat;
pub mod transcript;
pub mod workflow;

#[cfg(test)]
mod testing;

pub use auth::{AuthError, LoginFlow, LoginStep};
pub use chat::{ChatSession, ChatUpdate, SendRejected};
pub use transcript::{ChatRole, Message, Transcript};
pub use workflow::{
    AnalyzerWorkflow, EditRejected, SubmitRejected, WorkflowError, WorkflowState, WorkflowStep,
};
