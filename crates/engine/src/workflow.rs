//! Three-step analysis wizard: URL → manual details → prediction.
//!
//! Each step's network call runs in a spawned task; its outcome is applied
//! when the owner calls `poll` or `settle`. At most one call is outstanding.

use std::future::Future;
use std::sync::Arc;

use futures::future::{AbortHandle, Abortable};
use gateway::{Gateway, Operation};
use serde_json::{json, Value};
use shared::analysis::{
    prediction_payload, AnalysisSubject, AttributeError, ManualAttributes, PredictionResult,
};
use shared::GatewayError;
use tokio::sync::oneshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowStep {
    AwaitingUrl,
    AwaitingDetails,
    ShowingResult,
}

/// Wizard state. Each variant carries exactly the data valid in it.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowState {
    AwaitingUrl,
    AwaitingDetails {
        subject: AnalysisSubject,
        attributes: ManualAttributes,
    },
    ShowingResult {
        subject: AnalysisSubject,
        attributes: ManualAttributes,
        prediction: PredictionResult,
    },
}

impl WorkflowState {
    pub fn step(&self) -> WorkflowStep {
        match self {
            WorkflowState::AwaitingUrl => WorkflowStep::AwaitingUrl,
            WorkflowState::AwaitingDetails { .. } => WorkflowStep::AwaitingDetails,
            WorkflowState::ShowingResult { .. } => WorkflowStep::ShowingResult,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SubmitRejected {
    #[error("URL is empty")]
    EmptyUrl,
    #[error("a request is already in flight")]
    InFlight,
    #[error("not available in step {0:?}")]
    WrongStep(WorkflowStep),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EditRejected {
    #[error(transparent)]
    Attribute(#[from] AttributeError),
    #[error("details can only be edited in step AwaitingDetails, not {0:?}")]
    WrongStep(WorkflowStep),
}

/// Why the last step failed. Kept until the next successful transition or
/// reset.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("unexpected {operation} response: {detail}")]
    Malformed { operation: Operation, detail: String },

    #[error("inconsistent prediction: low {low} + high {high} is not 1")]
    InconsistentPrediction { low: f64, high: f64 },
}

impl WorkflowError {
    pub fn user_message(&self) -> String {
        match self {
            WorkflowError::Gateway(e) => e.server_message().to_string(),
            WorkflowError::Malformed { .. } => "The server sent an unexpected response.".into(),
            WorkflowError::InconsistentPrediction { .. } => {
                "The server returned an invalid prediction.".into()
            }
        }
    }
}

#[derive(Debug)]
enum StepOutcome {
    Analyzed(Result<AnalysisSubject, WorkflowError>),
    Predicted(Result<PredictionResult, WorkflowError>),
}

struct Pending {
    step: WorkflowStep,
    rx: oneshot::Receiver<StepOutcome>,
    abort: AbortHandle,
}

pub struct AnalyzerWorkflow {
    gateway: Arc<dyn Gateway>,
    state: WorkflowState,
    url: String,
    /// Latest manual attributes; seeds every AwaitingDetails and survives reset.
    remembered: ManualAttributes,
    error: Option<WorkflowError>,
    pending: Option<Pending>,
}

impl AnalyzerWorkflow {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self {
            gateway,
            state: WorkflowState::AwaitingUrl,
            url: String::new(),
            remembered: ManualAttributes::default(),
            error: None,
            pending: None,
        }
    }

    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    pub fn step(&self) -> WorkflowStep {
        self.state.step()
    }

    /// URL of the current run; empty before the first submit and after reset.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn error(&self) -> Option<&WorkflowError> {
        self.error.as_ref()
    }

    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(WorkflowError::user_message)
    }

    pub fn is_in_flight(&self) -> bool {
        self.pending.is_some()
    }

    /// Step whose call is outstanding, if any.
    pub fn pending_step(&self) -> Option<WorkflowStep> {
        self.pending.as_ref().map(|p| p.step)
    }

    pub fn subject(&self) -> Option<&AnalysisSubject> {
        match &self.state {
            WorkflowState::AwaitingUrl => None,
            WorkflowState::AwaitingDetails { subject, .. }
            | WorkflowState::ShowingResult { subject, .. } => Some(subject),
        }
    }

    pub fn attributes(&self) -> Option<&ManualAttributes> {
        match &self.state {
            WorkflowState::AwaitingUrl => None,
            WorkflowState::AwaitingDetails { attributes, .. }
            | WorkflowState::ShowingResult { attributes, .. } => Some(attributes),
        }
    }

    pub fn prediction(&self) -> Option<&PredictionResult> {
        match &self.state {
            WorkflowState::ShowingResult { prediction, .. } => Some(prediction),
            _ => None,
        }
    }

    /// Step one: ask the backend to analyze `url`. Must be called inside a
    /// Tokio runtime.
    pub fn submit_url(&mut self, url: &str) -> Result<(), SubmitRejected> {
        self.admit(WorkflowStep::AwaitingUrl)?;
        let url = url.trim();
        if url.is_empty() {
            return Err(SubmitRejected::EmptyUrl);
        }

        self.url = url.to_string();
        let gateway = self.gateway.clone();
        let payload = json!({ "url": url });
        self.dispatch(WorkflowStep::AwaitingUrl, async move {
            StepOutcome::Analyzed(analyze(gateway, payload).await)
        });
        tracing::info!(url = %self.url, "analyzing url");
        Ok(())
    }

    /// Change one manual attribute by its wire key.
    pub fn edit_field(&mut self, name: &str, value: &str) -> Result<(), EditRejected> {
        match &mut self.state {
            WorkflowState::AwaitingDetails { attributes, .. } => {
                attributes.set_by_key(name, value)?;
                self.remembered = attributes.clone();
                tracing::debug!(field = name, value, "attribute edited");
                Ok(())
            }
            other => Err(EditRejected::WrongStep(other.step())),
        }
    }

    /// Step two: request a prediction for the subject plus manual attributes.
    pub fn submit_details(&mut self) -> Result<(), SubmitRejected> {
        self.admit(WorkflowStep::AwaitingDetails)?;
        let (subject, attributes) = match &self.state {
            WorkflowState::AwaitingDetails {
                subject,
                attributes,
            } => (subject.clone(), attributes.clone()),
            other => return Err(SubmitRejected::WrongStep(other.step())),
        };

        let gateway = self.gateway.clone();
        self.dispatch(WorkflowStep::AwaitingDetails, async move {
            StepOutcome::Predicted(predict(gateway, subject, attributes).await)
        });
        tracing::info!("requesting prediction");
        Ok(())
    }

    /// Back to the first step from anywhere, abandoning any outstanding call.
    /// Manual attributes entered so far are kept for the next run.
    pub fn reset(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.abort.abort();
            tracing::debug!(step = ?pending.step, "outstanding call abandoned by reset");
        }
        self.state = WorkflowState::AwaitingUrl;
        self.url.clear();
        self.error = None;
    }

    /// Apply the outstanding call's outcome if it has arrived. Returns true
    /// when an outcome was applied.
    pub fn poll(&mut self) -> bool {
        let Some(pending) = self.pending.as_mut() else {
            return false;
        };
        let outcome = match pending.rx.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(oneshot::error::TryRecvError::Empty) => return false,
            Err(oneshot::error::TryRecvError::Closed) => None,
        };
        self.pending = None;
        self.apply(outcome);
        true
    }

    /// Wait for the outstanding call, if any, and apply its outcome.
    pub async fn settle(&mut self) -> bool {
        let Some(pending) = self.pending.as_mut() else {
            return false;
        };
        let outcome = (&mut pending.rx).await.ok();
        self.pending = None;
        self.apply(outcome);
        true
    }

    fn admit(&self, expected: WorkflowStep) -> Result<(), SubmitRejected> {
        let step = self.step();
        if step != expected {
            return Err(SubmitRejected::WrongStep(step));
        }
        if self.pending.is_some() {
            tracing::debug!(?step, "submit rejected, call already in flight");
            return Err(SubmitRejected::InFlight);
        }
        Ok(())
    }

    fn dispatch<F>(&mut self, step: WorkflowStep, call: F)
    where
        F: Future<Output = StepOutcome> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let (abort, registration) = AbortHandle::new_pair();
        tokio::spawn(Abortable::new(
            async move {
                let _ = tx.send(call.await);
            },
            registration,
        ));
        self.pending = Some(Pending { step, rx, abort });
    }

    /// `None` means the call task vanished without reporting.
    fn apply(&mut self, outcome: Option<StepOutcome>) {
        match outcome {
            Some(StepOutcome::Analyzed(Ok(subject))) => {
                tracing::info!(title = %subject.title, channel = %subject.channel_name, "url analyzed");
                self.state = WorkflowState::AwaitingDetails {
                    subject,
                    attributes: self.remembered.clone(),
                };
                self.error = None;
            }
            Some(StepOutcome::Predicted(Ok(prediction))) => {
                tracing::info!(label = %prediction.final_label, "prediction received");
                self.state = match std::mem::replace(&mut self.state, WorkflowState::AwaitingUrl) {
                    WorkflowState::AwaitingDetails {
                        subject,
                        attributes,
                    } => WorkflowState::ShowingResult {
                        subject,
                        attributes,
                        prediction,
                    },
                    other => other,
                };
                self.error = None;
            }
            Some(StepOutcome::Analyzed(Err(e))) | Some(StepOutcome::Predicted(Err(e))) => {
                tracing::warn!(step = ?self.step(), error = %e, "workflow step failed");
                self.error = Some(e);
            }
            None => {
                tracing::warn!(step = ?self.step(), "workflow call ended without a result");
                self.error = Some(WorkflowError::Gateway(GatewayError::Transport(
                    "request was interrupted".into(),
                )));
            }
        }
    }
}

impl Drop for AnalyzerWorkflow {
    fn drop(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.abort.abort();
        }
    }
}

async fn analyze(gateway: Arc<dyn Gateway>, payload: Value) -> Result<AnalysisSubject, WorkflowError> {
    let value = gateway.call(Operation::AnalyzeUrl, payload).await?;
    serde_json::from_value(value).map_err(|e| WorkflowError::Malformed {
        operation: Operation::AnalyzeUrl,
        detail: e.to_string(),
    })
}

async fn predict(
    gateway: Arc<dyn Gateway>,
    subject: AnalysisSubject,
    attributes: ManualAttributes,
) -> Result<PredictionResult, WorkflowError> {
    let malformed = |e: serde_json::Error| WorkflowError::Malformed {
        operation: Operation::Predict,
        detail: e.to_string(),
    };
    let payload = prediction_payload(&subject, &attributes).map_err(malformed)?;
    let value = gateway.call(Operation::Predict, payload).await?;
    let prediction: PredictionResult = serde_json::from_value(value).map_err(malformed)?;
    if !prediction.is_consistent() {
        return Err(WorkflowError::InconsistentPrediction {
            low: prediction.probability_low,
            high: prediction.probability_high,
        });
    }
    Ok(prediction)
}
