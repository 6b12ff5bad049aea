use reqwest::StatusCode;
use thiserror::Error;

/// Errors raised while asking the remote model for a brand.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The request never produced a response (connect, DNS, timeout, body read).
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The API answered with a status other than 200.
    #[error("API error ({status}): {body}")]
    Api { status: StatusCode, body: String },

    /// A 200 response whose body does not match the chat-completion schema.
    #[error("unexpected response shape: {0}")]
    UnexpectedResponse(String),
}

/// Errors raised while resolving the API key at startup.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// Neither the environment nor the secret store holds a usable key.
    #[error("API key not found. Please set {name} in environment or secrets.")]
    Missing { name: String },

    #[error("failed to read secrets file {path}: {source}")]
    SecretStoreRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse secrets file {path}: {source}")]
    SecretStoreParse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    /// The secret exists but is not a TOML string.
    #[error("secret {name} is not a string")]
    NotAString { name: String },
}

/// Errors that stop a driver before it offers the upload control.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Credentials(#[from] CredentialError),

    #[error("failed to build the HTTP client: {0}")]
    Client(#[from] ClientError),
}

/// Reasons an uploaded file is refused before it reaches the model.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UploadError {
    #[error("Invalid file extension")]
    MissingExtension,

    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),

    #[error("Uploaded file is empty")]
    Empty,
}

/// Errors raised when handing work to the detection engine.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("engine is still processing")]
    Busy,

    #[error("previous result has not been collected")]
    Unclaimed,

    #[error("engine is stopped")]
    Stopped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_carries_the_body() {
        let err = ClientError::Api {
            status: StatusCode::UNAUTHORIZED,
            body: "invalid api key".to_string(),
        };
        assert_eq!(err.to_string(), "API error (401 Unauthorized): invalid api key");
    }

    #[test]
    fn missing_credential_message() {
        let err = CredentialError::Missing {
            name: "GROQ_API_KEY".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "API key not found. Please set GROQ_API_KEY in environment or secrets."
        );
    }

    #[test]
    fn secrets_parse_error_names_the_file() {
        let source = toml::from_str::<toml::Table>("GROQ_API_KEY = ").unwrap_err();
        let err = CredentialError::SecretStoreParse {
            path: "secrets.toml".to_string(),
            source,
        };
        assert!(err.to_string().starts_with("failed to parse secrets file secrets.toml"));
    }
}
