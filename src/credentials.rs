//! API key resolution.
//!
//! The key is looked up once at startup: the process environment first, then a
//! TOML secrets file. The resolved [`ApiKey`] is handed to the client
//! explicitly; nothing is cached globally.

use std::path::Path;

use secrecy::{ExposeSecret, SecretString};

use crate::error::CredentialError;

/// Name of the environment variable and secret holding the API key.
pub const API_KEY_NAME: &str = "GROQ_API_KEY";

/// Default location of the secrets file, relative to the working directory.
pub const DEFAULT_SECRETS_PATH: &str = "secrets.toml";

/// Bearer credential for the inference API. `Debug` never prints the value.
pub struct ApiKey(SecretString);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(SecretString::from(key.into()))
    }

    /// Only call this when building the outgoing request.
    pub fn expose_secret(&self) -> &str {
        self.0.expose_secret()
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ApiKey([REDACTED])")
    }
}

impl From<&str> for ApiKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ApiKey {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Where a key was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Environment,
    SecretStore,
}

impl CredentialSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialSource::Environment => "environment",
            CredentialSource::SecretStore => "secret store",
        }
    }
}

/// Deployment secrets read from a flat TOML file, e.g. `GROQ_API_KEY = "gsk_..."`.
#[derive(Debug, Default)]
pub struct SecretStore {
    values: toml::Table,
}

impl SecretStore {
    /// Loads the secrets file. A file that does not exist yields an empty store.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CredentialError> {
        let path = path.as_ref();
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No secrets file at {}", path.display());
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(CredentialError::SecretStoreRead {
                    path: path.display().to_string(),
                    source,
                });
            }
        };

        let values = toml::from_str(&contents).map_err(|source| {
            CredentialError::SecretStoreParse {
                path: path.display().to_string(),
                source,
            }
        })?;
        Ok(Self { values })
    }

    pub fn from_table(values: toml::Table) -> Self {
        Self { values }
    }

    /// Returns the secret if present. Non-string values are an error.
    pub fn get(&self, name: &str) -> Result<Option<&str>, CredentialError> {
        match self.values.get(name) {
            None => Ok(None),
            Some(toml::Value::String(value)) => Ok(Some(value.as_str())),
            Some(_) => Err(CredentialError::NotAString {
                name: name.to_string(),
            }),
        }
    }
}

/// Resolves [`API_KEY_NAME`] from the process environment, then the secrets
/// file at `secrets_path`.
///
/// The file is only read when the environment does not provide the key.
pub fn resolve_api_key(
    secrets_path: impl AsRef<Path>,
) -> Result<(ApiKey, CredentialSource), CredentialError> {
    resolve_api_key_with(
        API_KEY_NAME,
        |name| std::env::var(name).ok(),
        || SecretStore::load(secrets_path),
    )
}

/// Resolves `name` using `env` as the environment lookup and `store` as the
/// fallback secret store.
///
/// Empty values count as absent in both sources; any other value is used as is.
pub fn resolve_api_key_with<F, S>(
    name: &str,
    env: F,
    store: S,
) -> Result<(ApiKey, CredentialSource), CredentialError>
where
    F: Fn(&str) -> Option<String>,
    S: FnOnce() -> Result<SecretStore, CredentialError>,
{
    if let Some(key) = env(name).filter(|v| !v.is_empty()) {
        log::debug!("Resolved {name} from the environment");
        return Ok((ApiKey::new(key), CredentialSource::Environment));
    }

    let store = store()?;
    if let Some(key) = store.get(name)?.filter(|v| !v.is_empty()) {
        log::debug!("Resolved {name} from the secret store");
        return Ok((ApiKey::new(key.to_string()), CredentialSource::SecretStore));
    }

    Err(CredentialError::Missing {
        name: name.to_string(),
    })
}
