//! Host directory
//!
//! Hosts are registered per owner under a short alias. The engine resolves an
//! alias to a [`HostTarget`] on every connect, including each reconnection
//! attempt, so credential edits take effect without restarting sessions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::connection::{HostTarget, DEFAULT_PORT};
use crate::credentials::{Credential, SecretString};
use crate::error::{Error, Result};

/// A host registered by an owner
#[derive(Debug, Clone)]
pub struct HostRecord {
    /// User who registered the host
    pub owner_id: String,
    /// Alias used in commands
    pub hostname: String,
    /// Network address
    pub address: String,
    /// Port, `None` for the default
    pub port: Option<u16>,
    /// Login name
    pub username: String,
    /// Password, if configured
    pub password: Option<SecretString>,
    /// Private key text, if configured
    pub key_material: Option<SecretString>,
}

impl HostRecord {
    /// Resolve this record into a connection target.
    ///
    /// Key material wins over a password when both are present. Empty
    /// secrets count as absent.
    pub fn target(&self) -> Result<HostTarget> {
        let present = |s: &Option<SecretString>| {
            s.clone().filter(|s| !s.expose().trim().is_empty())
        };

        let credential = match (present(&self.key_material), present(&self.password)) {
            (Some(key), _) => Credential::KeyMaterial(key),
            (None, Some(password)) => Credential::Password(password),
            (None, None) => {
                return Err(Error::CredentialMissing {
                    host: self.hostname.clone(),
                })
            }
        };

        Ok(HostTarget {
            hostname: self.hostname.clone(),
            address: self.address.clone(),
            port: self.port.unwrap_or(DEFAULT_PORT),
            username: self.username.clone(),
            credential,
        })
    }

    /// Listing entry without secrets
    #[must_use]
    pub fn summary(&self) -> HostSummary {
        HostSummary {
            hostname: self.hostname.clone(),
            address: self.address.clone(),
            port: self.port.unwrap_or(DEFAULT_PORT),
            username: self.username.clone(),
            auth: if self.key_material.is_some() {
                "publickey"
            } else if self.password.is_some() {
                "password"
            } else {
                "none"
            },
            updated_at: None,
        }
    }
}

/// Host listing entry
#[derive(Debug, Clone, Serialize)]
pub struct HostSummary {
    /// Alias
    pub hostname: String,
    /// Network address
    pub address: String,
    /// Port
    pub port: u16,
    /// Login name
    pub username: String,
    /// Authentication method configured
    pub auth: &'static str,
    /// Last modification time
    pub updated_at: Option<DateTime<Utc>>,
}

/// Lookup and maintenance of host records
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HostDirectory: Send + Sync {
    /// Find the host `hostname` registered by `owner_id`
    async fn get_host(&self, owner_id: &str, hostname: &str) -> Result<Option<HostRecord>>;

    /// Insert or replace a host record
    async fn upsert_host(&self, record: &HostRecord) -> Result<()>;

    /// Remove a host record
    async fn remove_host(&self, owner_id: &str, hostname: &str) -> Result<()>;

    /// All hosts registered by `owner_id`
    async fn list_hosts(&self, owner_id: &str) -> Result<Vec<HostSummary>>;
}

/// Resolve `hostname` for `owner_id` into a connection target
pub async fn resolve_target(
    hosts: &dyn HostDirectory,
    owner_id: &str,
    hostname: &str,
) -> Result<HostTarget> {
    hosts
        .get_host(owner_id, hostname)
        .await?
        .ok_or_else(|| Error::HostNotFound(hostname.to_string()))?
        .target()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> HostRecord {
        HostRecord {
            owner_id: "42".to_string(),
            hostname: "web1".to_string(),
            address: "10.0.0.5".to_string(),
            port: None,
            username: "deploy".to_string(),
            password: None,
            key_material: None,
        }
    }

    #[test]
    fn test_missing_credentials() {
        let err = record().target().unwrap_err();
        assert!(matches!(err, Error::CredentialMissing { host } if host == "web1"));

        let blank = HostRecord {
            password: Some(SecretString::new("  ")),
            ..record()
        };
        assert!(blank.target().is_err());
    }

    #[test]
    fn test_default_port_and_password() {
        let host = HostRecord {
            password: Some(SecretString::new("pw")),
            ..record()
        };
        let target = host.target().unwrap();
        assert_eq!(target.port, 22);
        assert!(matches!(target.credential, Credential::Password(_)));
    }

    #[test]
    fn test_key_preferred_over_password() {
        let host = HostRecord {
            port: Some(2222),
            password: Some(SecretString::new("pw")),
            key_material: Some(SecretString::new("-----BEGIN KEY-----")),
            ..record()
        };
        let target = host.target().unwrap();
        assert_eq!(target.port, 2222);
        assert!(matches!(target.credential, Credential::KeyMaterial(_)));
        assert_eq!(host.summary().auth, "publickey");
    }

    #[tokio::test]
    async fn test_resolve_unknown_host() {
        let mut hosts = MockHostDirectory::new();
        hosts.expect_get_host().returning(|_, _| Ok(None));

        let err = resolve_target(&hosts, "42", "ghost").await.unwrap_err();
        assert!(matches!(err, Error::HostNotFound(name) if name == "ghost"));
    }
}
