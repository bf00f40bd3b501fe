//! Credential resolution for git transports

use std::time::Instant;

use git2::{Cred, RemoteCallbacks};
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::credentials::AuthDescriptor;
use crate::errors::DockhandError;

/// Default SSH user for git hosts
pub const DEFAULT_SSH_USER: &str = "git";

/// Transport credentials derived from an [`AuthDescriptor`]
#[derive(Debug)]
pub enum ResolvedAuth {
    /// Public repository
    Anonymous,

    Basic {
        username: String,
        token: SecretString,
    },

    SshKey {
        user: String,
        private_key: SecretString,
    },
}

/// Resolve a descriptor into exactly one transport credential.
///
/// HTTP credentials win when both are populated.
pub fn resolve_auth(auth: Option<&AuthDescriptor>) -> Result<ResolvedAuth, DockhandError> {
    let Some(auth) = auth else {
        return Ok(ResolvedAuth::Anonymous);
    };

    if let Some(http) = &auth.http {
        return Ok(ResolvedAuth::Basic {
            username: http.username.clone(),
            token: SecretString::from(http.token.expose_secret().to_owned()),
        });
    }

    if let Some(ssh) = &auth.ssh {
        if ssh.private_key.expose_secret().trim().is_empty() {
            return Err(DockhandError::GitError("SSH private key is empty".to_string()));
        }
        return Ok(ResolvedAuth::SshKey {
            user: ssh
                .user
                .clone()
                .filter(|u| !u.is_empty())
                .unwrap_or_else(|| DEFAULT_SSH_USER.to_string()),
            private_key: SecretString::from(ssh.private_key.expose_secret().to_owned()),
        });
    }

    Ok(ResolvedAuth::Anonymous)
}

/// Build remote callbacks carrying the credentials and aborting transfers
/// once `deadline` passes.
pub fn remote_callbacks(auth: ResolvedAuth, deadline: Instant) -> RemoteCallbacks<'static> {
    let mut callbacks = RemoteCallbacks::new();
    let mut attempts = 0u32;

    match auth {
        ResolvedAuth::Anonymous => {}
        ResolvedAuth::Basic { username, token } => {
            callbacks.credentials(move |url, _, _| {
                attempts += 1;
                if attempts > 1 {
                    return Err(git2::Error::from_str("authentication failed"));
                }
                debug!("Using HTTP credentials for {}", url);
                Cred::userpass_plaintext(&username, token.expose_secret())
            });
        }
        ResolvedAuth::SshKey { user, private_key } => {
            callbacks.credentials(move |url, _, _| {
                attempts += 1;
                if attempts > 1 {
                    return Err(git2::Error::from_str("authentication failed"));
                }
                debug!("Using SSH key for {}", url);
                Cred::ssh_key_from_memory(&user, None, private_key.expose_secret(), None)
            });
        }
    }

    callbacks.transfer_progress(move |_| Instant::now() < deadline);
    callbacks
}
