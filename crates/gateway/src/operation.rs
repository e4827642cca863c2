/// Named backend operations. Each maps to one POST endpoint on the backend
/// origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    SendOtp,
    VerifyOtp,
    AnalyzeUrl,
    Predict,
    Chat,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::SendOtp => "send-otp",
            Operation::VerifyOtp => "verify-otp",
            Operation::AnalyzeUrl => "analyze-url",
            Operation::Predict => "predict",
            Operation::Chat => "chat",
        }
    }

    /// Shown when the backend fails without saying why.
    pub fn fallback_message(&self) -> &'static str {
        match self {
            Operation::SendOtp => "Failed to send OTP.",
            Operation::VerifyOtp => "OTP verification failed.",
            Operation::AnalyzeUrl => "Failed to analyze URL.",
            Operation::Predict => "Prediction failed.",
            Operation::Chat => "Chat request failed.",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
