//! Credentials for registry sources
//!
//! A source may carry credentials inline in the configuration. When it does
//! not, the Docker config file is consulted for an entry matching the
//! source host, the same lookup `docker login` populates.

use anyhow::Result;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

mod keychain;

pub use keychain::{DockerConfigKeychain, Keychain};

/// Authentication configuration containing credentials
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registry_token: Option<String>,
}

impl AuthConfig {
    pub fn basic(username: String, password: String) -> Self {
        Self {
            username: Some(username),
            password: Some(password),
            ..Default::default()
        }
    }

    pub fn bearer(token: String) -> Self {
        Self {
            registry_token: Some(token),
            ..Default::default()
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn is_anonymous(&self) -> bool {
        self.username.is_none()
            && self.password.is_none()
            && self.auth.is_none()
            && self.identity_token.is_none()
            && self.registry_token.is_none()
    }

    /// Value for the `Authorization` header, if these credentials produce one
    pub fn to_authorization_header(&self) -> Result<Option<String>> {
        if let Some(token) = &self.registry_token {
            return Ok(Some(format!("Bearer {}", token)));
        }

        if let Some(token) = &self.identity_token {
            return Ok(Some(format!("Bearer {}", token)));
        }

        if let Some(auth) = &self.auth {
            return Ok(Some(format!("Basic {}", auth)));
        }

        match (&self.username, &self.password) {
            (Some(username), Some(password)) => {
                let encoded = base64::engine::general_purpose::STANDARD
                    .encode(format!("{}:{}", username, password));
                Ok(Some(format!("Basic {}", encoded)))
            }
            (Some(username), None) => {
                anyhow::bail!("Username {} configured without a password", username)
            }
            _ => Ok(None),
        }
    }
}

/// Docker config file structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DockerConfig {
    #[serde(default)]
    pub auths: HashMap<String, DockerAuthEntry>,
}

/// Entry in the Docker config auths section
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DockerAuthEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(rename = "identitytoken", skip_serializing_if = "Option::is_none")]
    pub identity_token: Option<String>,
    #[serde(rename = "registrytoken", skip_serializing_if = "Option::is_none")]
    pub registry_token: Option<String>,
}

impl From<&DockerAuthEntry> for AuthConfig {
    fn from(entry: &DockerAuthEntry) -> Self {
        AuthConfig {
            username: entry.username.clone(),
            password: entry.password.clone(),
            auth: entry.auth.clone(),
            identity_token: entry.identity_token.clone(),
            registry_token: entry.registry_token.clone(),
        }
    }
}

#[cfg(test)]
mod tests;
