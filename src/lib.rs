//! Guess the brand of a bag from a photo using a hosted vision model.
//!
//! The crate has two layers:
//!
//! - [`GroqClient`] turns image bytes into a brand name with one call to an
//!   OpenAI-compatible chat-completion endpoint. The API key comes from
//!   [`resolve_api_key`] and is passed in explicitly.
//! - [`DetectionEngine`] runs any [`InferenceModel`] on a worker thread, one
//!   request at a time, so an interactive front end can show a busy state and
//!   poll for the answer.
//!
//! ```no_run
//! use bagbrand::{ClientConfig, GroqClient, resolve_api_key};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let (api_key, _source) = resolve_api_key("secrets.toml")?;
//! let client = GroqClient::new(api_key, ClientConfig::default())?;
//!
//! let brand = client.analyze_image(&std::fs::read("bag.jpg")?)?;
//! println!("Brand: {brand}");
//! # Ok(())
//! # }
//! ```

mod client;
mod credentials;
mod engine;
mod error;
pub mod messages;
mod model;

pub use client::{
    ClientConfig, DECLARED_IMAGE_MIME, DEFAULT_ENDPOINT, DEFAULT_MAX_TOKENS, DEFAULT_MODEL,
    DEFAULT_PROMPT, GroqClient, image_data_uri,
};
pub use credentials::{
    API_KEY_NAME, ApiKey, CredentialSource, DEFAULT_SECRETS_PATH, SecretStore, resolve_api_key,
    resolve_api_key_with,
};
pub use engine::{DetectionEngine, EngineResponse, EngineResult, EngineState};
pub use error::{ClientError, CredentialError, EngineError, StartupError, UploadError};
pub use model::{ACCEPTED_EXTENSIONS, ImagePayload, InferenceModel, RequestMetadata, UploadInfo};
