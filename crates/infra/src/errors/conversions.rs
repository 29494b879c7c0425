//! Conversions from external infrastructure errors into domain errors.

use keyring::Error as KeyringError;
use novem_domain::NovemError;
use reqwest::Error as HttpError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub NovemError);

impl From<InfraError> for NovemError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<NovemError> for InfraError {
    fn from(value: NovemError) -> Self {
        InfraError(value)
    }
}

trait IntoNovemError {
    fn into_novem(self) -> NovemError;
}

/* -------------------------------------------------------------------------- */
/* keyring::Error → NovemError */
/* -------------------------------------------------------------------------- */

impl IntoNovemError for KeyringError {
    fn into_novem(self) -> NovemError {
        use KeyringError::*;

        let description = self.to_string();

        match self {
            NoEntry => NovemError::NotFound("keychain entry not found".into()),
            BadEncoding(_) => {
                NovemError::Storage("credential in keychain is not valid UTF-8".into())
            }
            TooLong(name, limit) => NovemError::Storage(format!(
                "keychain attribute '{name}' exceeds platform limit ({limit})"
            )),
            Invalid(attr, reason) => {
                NovemError::Storage(format!("keychain attribute '{attr}' is invalid: {reason}"))
            }
            PlatformFailure(err) => NovemError::Storage(format!("keychain platform error: {err}")),
            NoStorageAccess(err) => {
                NovemError::Storage(format!("unable to access secure storage: {err}"))
            }
            _ => NovemError::Storage(description),
        }
    }
}

impl From<KeyringError> for InfraError {
    fn from(value: KeyringError) -> Self {
        InfraError(value.into_novem())
    }
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → NovemError */
/* -------------------------------------------------------------------------- */

impl IntoNovemError for HttpError {
    fn into_novem(self) -> NovemError {
        if self.is_builder() {
            return NovemError::Config(format!("invalid HTTP client configuration: {self}"));
        }

        if self.is_timeout() {
            return NovemError::Network("HTTP request timed out".into());
        }

        #[cfg(not(target_arch = "wasm32"))]
        if self.is_connect() {
            return NovemError::Network("HTTP connection failure".into());
        }

        NovemError::Network(self.to_string())
    }
}

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        InfraError(value.into_novem())
    }
}

/* -------------------------------------------------------------------------- */
/* std::io / serde_json / toml → NovemError */
/* -------------------------------------------------------------------------- */

impl From<std::io::Error> for InfraError {
    fn from(value: std::io::Error) -> Self {
        let error = match value.kind() {
            std::io::ErrorKind::NotFound => NovemError::NotFound(value.to_string()),
            _ => NovemError::Storage(format!("I/O error: {value}")),
        };
        InfraError(error)
    }
}

impl From<serde_json::Error> for InfraError {
    fn from(value: serde_json::Error) -> Self {
        InfraError(NovemError::Storage(format!("invalid JSON: {value}")))
    }
}

impl From<toml::de::Error> for InfraError {
    fn from(value: toml::de::Error) -> Self {
        InfraError(NovemError::Config(format!("Invalid TOML format: {value}")))
    }
}
