pub mod analysis;
pub mod error;

pub use error::GatewayError;

pub mod settings {
    use serde::{Deserialize, Serialize};

    /// Environment variable that overrides the configured backend origin.
    pub const BACKEND_URL_ENV: &str = "DOPAMINE_BACKEND_URL";

    pub const DEFAULT_GREETING: &str = "Hi there! I can answer questions about this website or the concept of dopamine in content. How can I help?";
    pub const DEFAULT_APOLOGY: &str = "Sorry, I ran into an error. Please try again.";

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    #[serde(default)]
    pub struct ClientSettings {
        /// Origin every backend operation is addressed to, e.g. "http://127.0.0.1:5000"
        pub backend_url: String,
        /// Whole-request timeout for ordinary request/response calls (not streams)
        pub request_timeout_secs: u64,
        pub connect_timeout_secs: u64,
        /// Assistant message shown before the first user turn. Empty disables it.
        pub chat_greeting: String,
        /// Replaces the assistant reply when a chat stream fails
        pub chat_apology: String,
    }

    impl Default for ClientSettings {
        fn default() -> Self {
            Self {
                backend_url: "http://127.0.0.1:5000".into(),
                request_timeout_secs: 120,
                connect_timeout_secs: 10,
                chat_greeting: DEFAULT_GREETING.into(),
                chat_apology: DEFAULT_APOLOGY.into(),
            }
        }
    }

    impl ClientSettings {
        /// Apply environment overrides on top of file/default values.
        pub fn with_env_overrides(mut self) -> Self {
            if let Ok(url) = std::env::var(BACKEND_URL_ENV) {
                let url = url.trim();
                if !url.is_empty() {
                    self.backend_url = url.to_string();
                }
            }
            self
        }
    }

}
