//! Blocking client for the hosted vision model.

use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as Base64;
use reqwest::StatusCode;
use reqwest::blocking::Client;

use crate::credentials::{ApiKey, CredentialSource};
use crate::error::{ClientError, CredentialError, StartupError};
use crate::messages::{ChatCompletionRequest, ChatCompletionResponse};
use crate::model::{ImagePayload, InferenceModel};

pub const DEFAULT_ENDPOINT: &str = "https://api.groq.com/openai/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "meta-llama/llama-4-scout-17b-16e-instruct";
pub const DEFAULT_PROMPT: &str =
    "What is brand of the bag, give me the bag brand only as an output?";
pub const DEFAULT_MAX_TOKENS: u32 = 50;

/// MIME type declared in the data URI, whatever the upload actually is.
pub const DECLARED_IMAGE_MIME: &str = "image/jpeg";

/// Settings for [`GroqClient`]. The defaults target the hosted endpoint.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub endpoint: String,
    pub model: String,
    pub prompt: String,
    pub max_tokens: u32,
    /// `None` keeps the HTTP client's own default.
    pub timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            prompt: DEFAULT_PROMPT.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout: None,
        }
    }
}

impl ClientConfig {
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Encodes `bytes` as a base64 data URI declared as [`DECLARED_IMAGE_MIME`].
pub fn image_data_uri(bytes: &[u8]) -> String {
    format!("data:{DECLARED_IMAGE_MIME};base64,{}", Base64.encode(bytes))
}

/// Asks a chat-completion endpoint which brand a bag photo shows.
///
/// Each call is one independent POST: no retries, no caching. The client must
/// not be created or dropped inside an async runtime since it wraps
/// [`reqwest::blocking::Client`].
pub struct GroqClient {
    http: Client,
    api_key: ApiKey,
    config: ClientConfig,
}

impl GroqClient {
    pub fn new(api_key: ApiKey, config: ClientConfig) -> Result<Self, ClientError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            http: builder.build()?,
            api_key,
            config,
        })
    }

    /// Resolves the API key with `resolve`, then builds the client.
    ///
    /// Nothing is sent: a missing key fails here, before any caller can
    /// reach [`analyze_image`](Self::analyze_image).
    pub fn from_credentials<F>(resolve: F, config: ClientConfig) -> Result<Self, StartupError>
    where
        F: FnOnce() -> Result<(ApiKey, CredentialSource), CredentialError>,
    {
        let (api_key, source) = resolve()?;
        log::info!("Using the API key from the {}", source.as_str());
        Ok(Self::new(api_key, config)?)
    }

    /// Returns the model's answer for `image_bytes`, trimmed of surrounding whitespace.
    ///
    /// The bytes are forwarded as is; a malformed image is left for the remote
    /// service to reject.
    pub fn analyze_image(&self, image_bytes: &[u8]) -> Result<String, ClientError> {
        let request = ChatCompletionRequest::describe_image(
            self.config.model.as_str(),
            self.config.prompt.as_str(),
            image_data_uri(image_bytes),
            self.config.max_tokens,
        );

        log::debug!(
            "Sending {} image bytes to {}",
            image_bytes.len(),
            self.config.endpoint
        );

        let response = self
            .http
            .post(&self.config.endpoint)
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()?;

        let status = response.status();
        let body = response.text()?;

        if status != StatusCode::OK {
            log::warn!("Inference API returned {status}");
            return Err(ClientError::Api { status, body });
        }

        parse_brand(&body)
    }
}

fn parse_brand(body: &str) -> Result<String, ClientError> {
    let response: ChatCompletionResponse = serde_json::from_str(body)
        .map_err(|e| ClientError::UnexpectedResponse(e.to_string()))?;

    response
        .first_content()
        .map(|content| content.trim().to_string())
        .ok_or_else(|| ClientError::UnexpectedResponse("response has no choices".to_string()))
}

impl InferenceModel for GroqClient {
    type Request = ImagePayload;
    type Response = String;
    type Error = ClientError;

    fn run(&mut self, request: Self::Request) -> Result<Self::Response, Self::Error> {
        self.analyze_image(&request.bytes)
    }
}
