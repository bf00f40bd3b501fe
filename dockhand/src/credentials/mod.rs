//! Repository credentials and their at-rest encryption

pub mod codec;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::errors::DockhandError;

pub use codec::AgeCodec;

/// HTTP basic credentials (username plus token or password)
#[derive(Debug)]
pub struct HttpCredentials {
    pub username: String,
    pub token: SecretString,
}

impl Clone for HttpCredentials {
    fn clone(&self) -> Self {
        Self {
            username: self.username.clone(),
            token: SecretString::from(self.token.expose_secret().to_owned()),
        }
    }
}

/// PEM-encoded SSH private key
#[derive(Debug)]
pub struct SshCredentials {
    pub private_key: SecretString,

    /// Defaults to `git` when absent
    pub user: Option<String>,
}

impl Clone for SshCredentials {
    fn clone(&self) -> Self {
        Self {
            private_key: SecretString::from(self.private_key.expose_secret().to_owned()),
            user: self.user.clone(),
        }
    }
}

/// Authentication descriptor for a repository. Both fields empty means
/// public access.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(from = "PlainAuth")]
pub struct AuthDescriptor {
    pub http: Option<HttpCredentials>,
    pub ssh: Option<SshCredentials>,
}

impl AuthDescriptor {
    pub fn http(username: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http: Some(HttpCredentials {
                username: username.into(),
                token: SecretString::from(token.into()),
            }),
            ssh: None,
        }
    }

    pub fn ssh(private_key: impl Into<String>, user: Option<String>) -> Self {
        Self {
            http: None,
            ssh: Some(SshCredentials {
                private_key: SecretString::from(private_key.into()),
                user,
            }),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.http.is_none() && self.ssh.is_none()
    }

    /// Kind recorded next to the encrypted blob
    pub fn kind(&self) -> Option<CredentialKind> {
        if self.http.is_some() {
            Some(CredentialKind::Http)
        } else if self.ssh.is_some() {
            Some(CredentialKind::Ssh)
        } else {
            None
        }
    }
}

/// Serializable mirror of [`AuthDescriptor`], used only at the request and
/// encryption boundaries.
#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct PlainAuth {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<PlainHttp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh: Option<PlainSsh>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct PlainHttp {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct PlainSsh {
    #[serde(default)]
    pub private_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

impl From<PlainAuth> for AuthDescriptor {
    fn from(plain: PlainAuth) -> Self {
        let http = plain
            .http
            .filter(|h| !h.username.is_empty() || !h.token.is_empty())
            .map(|h| HttpCredentials {
                username: h.username,
                token: SecretString::from(h.token),
            });
        let ssh = plain.ssh.map(|s| SshCredentials {
            private_key: SecretString::from(s.private_key),
            user: s.user.filter(|u| !u.is_empty()),
        });
        Self { http, ssh }
    }
}

impl From<&AuthDescriptor> for PlainAuth {
    fn from(auth: &AuthDescriptor) -> Self {
        Self {
            http: auth.http.as_ref().map(|h| PlainHttp {
                username: h.username.clone(),
                token: h.token.expose_secret().to_owned(),
            }),
            ssh: auth.ssh.as_ref().map(|s| PlainSsh {
                private_key: s.private_key.expose_secret().to_owned(),
                user: s.user.clone(),
            }),
        }
    }
}

/// Which credential the sealed blob holds
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CredentialKind {
    Http,
    Ssh,
}

/// Encrypted authentication descriptor as persisted with the workload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SealedCredentials {
    pub kind: CredentialKind,

    /// Base64 ciphertext
    pub blob: String,
}

/// Encrypts and decrypts authentication descriptors
pub trait CredentialCodec: Send + Sync {
    fn encrypt(&self, auth: &AuthDescriptor) -> Result<SealedCredentials, DockhandError>;

    fn decrypt(&self, sealed: &SealedCredentials) -> Result<AuthDescriptor, DockhandError>;
}
