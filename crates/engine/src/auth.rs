//! Email one-time-code login. Only the two backend calls are modeled; the
//! result is a single "authenticated" signal.

use std::sync::Arc;

use gateway::{Gateway, Operation};
use serde_json::{json, Value};
use shared::GatewayError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginStep {
    EnterEmail,
    EnterCode { email: String },
    Authenticated { email: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("email is empty")]
    EmptyEmail,
    #[error("code is empty")]
    EmptyCode,
    #[error("no code has been requested")]
    NoCodeRequested,
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl AuthError {
    pub fn user_message(&self) -> String {
        match self {
            AuthError::Gateway(e) => e.server_message().to_string(),
            other => other.to_string(),
        }
    }
}

pub struct LoginFlow {
    gateway: Arc<dyn Gateway>,
    step: LoginStep,
    error: Option<AuthError>,
}

impl LoginFlow {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self {
            gateway,
            step: LoginStep::EnterEmail,
            error: None,
        }
    }

    pub fn step(&self) -> &LoginStep {
        &self.step
    }

    pub fn error(&self) -> Option<&AuthError> {
        self.error.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self.step, LoginStep::Authenticated { .. })
    }

    /// Ask the backend to mail a code to `email`. On success returns the
    /// server's confirmation text and moves to the code step.
    pub async fn request_code(&mut self, email: &str) -> Result<String, AuthError> {
        let email = email.trim();
        if email.is_empty() {
            return Err(AuthError::EmptyEmail);
        }

        let result = self
            .gateway
            .call(Operation::SendOtp, json!({ "email": email }))
            .await;
        match result {
            Ok(body) => {
                tracing::info!(email, "login code requested");
                self.step = LoginStep::EnterCode {
                    email: email.to_string(),
                };
                self.error = None;
                Ok(confirmation(&body, "OTP sent successfully!"))
            }
            Err(e) => Err(self.fail(e.into())),
        }
    }

    /// Check `code` against the requested email. A rejected code sends the
    /// flow back to the email step.
    pub async fn verify(&mut self, code: &str) -> Result<String, AuthError> {
        let code = code.trim();
        let email = match &self.step {
            LoginStep::EnterCode { email } => email.clone(),
            _ => return Err(AuthError::NoCodeRequested),
        };
        if code.is_empty() {
            return Err(AuthError::EmptyCode);
        }

        let result = self
            .gateway
            .call(Operation::VerifyOtp, json!({ "email": email, "otp": code }))
            .await;
        match result {
            Ok(body) => {
                tracing::info!(email = %email, "login verified");
                self.step = LoginStep::Authenticated { email };
                self.error = None;
                Ok(confirmation(&body, "Login successful!"))
            }
            Err(e) => {
                self.step = LoginStep::EnterEmail;
                Err(self.fail(e.into()))
            }
        }
    }

    pub fn logout(&mut self) {
        self.step = LoginStep::EnterEmail;
        self.error = None;
    }

    fn fail(&mut self, error: AuthError) -> AuthError {
        tracing::warn!(error = %error, "login step failed");
        self.error = Some(error.clone());
        error
    }
}

fn confirmation(body: &Value, fallback: &str) -> String {
    body.get("message")
        .and_then(Value::as_str)
        .unwrap_or(fallback)
        .to_string()
}
