//! Request credentials.
//!
//! FastGPT app keys travel as a bearer token. Deployments behind a gateway
//! that expects its own header can swap in another [`AuthProvider`] through
//! [`FastGptClientBuilder::auth`](crate::client::FastGptClientBuilder::auth).

use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;

use crate::errors::{FastGptError, FastGptResult};

/// Adds credentials to outgoing requests.
pub trait AuthProvider: Send + Sync {
    /// Inserts the credential headers.
    fn apply_auth(&self, headers: &mut HashMap<String, String>);

    /// Checked before every call, after the config itself.
    fn validate(&self) -> FastGptResult<()> {
        Ok(())
    }
}

/// `Authorization: Bearer <app key>`.
pub struct BearerAuth {
    token: SecretString,
}

impl BearerAuth {
    /// Wraps an app key.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: SecretString::new(token.into()),
        }
    }
}

impl AuthProvider for BearerAuth {
    fn apply_auth(&self, headers: &mut HashMap<String, String>) {
        headers.insert(
            "Authorization".to_string(),
            format!("Bearer {}", self.token.expose_secret()),
        );
    }

    fn validate(&self) -> FastGptResult<()> {
        let token = self.token.expose_secret();
        if token.trim().is_empty() {
            return Err(FastGptError::configuration("API key cannot be empty"));
        }
        if !token.starts_with("fastgpt-") {
            tracing::debug!("API key is not a fastgpt-* app key");
        }
        Ok(())
    }
}

impl std::fmt::Debug for BearerAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerAuth").finish_non_exhaustive()
    }
}
