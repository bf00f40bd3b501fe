//! age-backed credential codec.
//!
//! Descriptors are serialized to JSON, encrypted to the X25519 recipient of a
//! local identity and stored as base64. The identity file is created with
//! owner-only permissions on first use.

use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use age::secrecy::ExposeSecret;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use tracing::info;

use crate::credentials::{AuthDescriptor, CredentialCodec, PlainAuth, SealedCredentials};
use crate::errors::DockhandError;

/// Credential codec using an age X25519 identity
pub struct AgeCodec {
    identity: age::x25519::Identity,
    recipient: age::x25519::Recipient,
}

impl AgeCodec {
    /// Use an existing identity
    pub fn new(identity: age::x25519::Identity) -> Self {
        let recipient = identity.to_public();
        Self {
            identity,
            recipient,
        }
    }

    /// Load the identity from `key_file`, generating it if missing
    pub fn load_or_create(key_file: &Path) -> Result<Self, DockhandError> {
        if !key_file.exists() {
            Self::create_identity(key_file)?;
        }
        Ok(Self::new(Self::load_identity(key_file)?))
    }

    fn load_identity(path: &Path) -> Result<age::x25519::Identity, DockhandError> {
        let mut contents = String::new();
        fs::File::open(path)
            .and_then(|mut f| f.read_to_string(&mut contents))
            .map_err(|e| {
                DockhandError::CredentialError(format!(
                    "Failed to read key file {}: {}",
                    path.display(),
                    e
                ))
            })?;

        contents
            .lines()
            .find(|line| !line.starts_with('#') && !line.trim().is_empty())
            .ok_or_else(|| DockhandError::CredentialError("Key file is empty".to_string()))?
            .trim()
            .parse::<age::x25519::Identity>()
            .map_err(|e| DockhandError::CredentialError(format!("Invalid key file: {}", e)))
    }

    fn create_identity(path: &Path) -> Result<(), DockhandError> {
        let identity = age::x25519::Identity::generate();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        #[cfg(unix)]
        let mut file = {
            use std::os::unix::fs::OpenOptionsExt;
            fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .mode(0o600)
                .open(path)?
        };

        #[cfg(not(unix))]
        let mut file = fs::File::create(path)?;

        writeln!(file, "# public key: {}", identity.to_public())?;
        writeln!(file, "{}", identity.to_string().expose_secret())?;

        info!("Generated credential key at {}", path.display());
        Ok(())
    }

    fn encrypt_bytes(&self, plaintext: &[u8]) -> Result<Vec<u8>, DockhandError> {
        let encryptor = age::Encryptor::with_recipients(vec![Box::new(self.recipient.clone())])
            .ok_or_else(|| {
                DockhandError::CredentialError("No valid encryption recipients".to_string())
            })?;

        let mut encrypted = vec![];
        let mut writer = encryptor
            .wrap_output(&mut encrypted)
            .map_err(|e| DockhandError::CredentialError(format!("Failed to encrypt: {}", e)))?;
        writer.write_all(plaintext)?;
        writer
            .finish()
            .map_err(|e| DockhandError::CredentialError(format!("Failed to encrypt: {}", e)))?;

        Ok(encrypted)
    }

    fn decrypt_bytes(&self, ciphertext: &[u8]) -> Result<Vec<u8>, DockhandError> {
        let age::Decryptor::Recipients(decryptor) = age::Decryptor::new(ciphertext)
            .map_err(|e| DockhandError::CredentialError(format!("Failed to decrypt: {}", e)))?
        else {
            return Err(DockhandError::CredentialError(
                "Unexpected passphrase-encrypted credentials".to_string(),
            ));
        };

        let identity: &dyn age::Identity = &self.identity;
        let mut reader = decryptor
            .decrypt(std::iter::once(identity))
            .map_err(|e| DockhandError::CredentialError(format!("Failed to decrypt: {}", e)))?;

        let mut decrypted = vec![];
        reader.read_to_end(&mut decrypted)?;
        Ok(decrypted)
    }
}

impl CredentialCodec for AgeCodec {
    fn encrypt(&self, auth: &AuthDescriptor) -> Result<SealedCredentials, DockhandError> {
        let kind = auth.kind().ok_or_else(|| {
            DockhandError::CredentialError("Cannot encrypt empty credentials".to_string())
        })?;

        let plaintext = serde_json::to_vec(&PlainAuth::from(auth))?;
        let encrypted = self.encrypt_bytes(&plaintext)?;

        Ok(SealedCredentials {
            kind,
            blob: BASE64.encode(encrypted),
        })
    }

    fn decrypt(&self, sealed: &SealedCredentials) -> Result<AuthDescriptor, DockhandError> {
        let ciphertext = BASE64
            .decode(&sealed.blob)
            .map_err(|e| DockhandError::CredentialError(format!("Invalid base64: {}", e)))?;
        let plaintext = self.decrypt_bytes(&ciphertext)?;
        let plain: PlainAuth = serde_json::from_slice(&plaintext)?;
        Ok(AuthDescriptor::from(plain))
    }
}
