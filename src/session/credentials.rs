//! SSH credentials
//!
//! Resolves the authentication material once at startup. The result is
//! reused for every redial, so the user is prompted at most once.

use crate::config::{SshAuthKind, SshConfig};
use anyhow::{Context, Result};
use dialoguer::Password;
use russh::keys::PrivateKey;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Private key names probed in `~/.ssh`, in order
pub const DEFAULT_KEY_NAMES: &[&str] = &["id_rsa", "id_ed25519", "id_ecdsa", "id_dsa"];

/// Resolved SSH authentication material
#[derive(Clone)]
pub enum SshAuth {
    /// Public key authentication with a decoded private key
    PublicKey {
        /// Where the key was loaded from
        path: PathBuf,
        /// Decoded key
        key: Arc<PrivateKey>,
    },
    /// Password authentication
    Password(String),
}

impl fmt::Debug for SshAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SshAuth::PublicKey { path, .. } => {
                f.debug_struct("PublicKey").field("path", path).finish()
            }
            SshAuth::Password(_) => f.write_str("Password(***)"),
        }
    }
}

/// Home directory from `HOME` or `USERPROFILE`, falling back to `.`
pub fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .filter(|h| !h.is_empty())
        .or_else(|| std::env::var_os("USERPROFILE").filter(|h| !h.is_empty()))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Find the first private key in `dir` that has a matching `.pub` file
pub fn find_ssh_key_in(dir: &Path) -> Option<PathBuf> {
    DEFAULT_KEY_NAMES.iter().find_map(|name| {
        let private = dir.join(name);
        let public = dir.join(format!("{}.pub", name));
        (private.is_file() && public.is_file()).then_some(private)
    })
}

/// Find a private key in `~/.ssh`
pub fn find_ssh_key() -> Result<PathBuf> {
    let dir = home_dir().join(".ssh");
    find_ssh_key_in(&dir).with_context(|| {
        format!(
            "No usable SSH private key found in {:?} (looked for {} with a matching .pub file)",
            dir,
            DEFAULT_KEY_NAMES.join(", ")
        )
    })
}

/// Load and decode a private key, prompting for a passphrase if encrypted
pub fn load_private_key(path: &Path) -> Result<PrivateKey> {
    match russh::keys::load_secret_key(path, None) {
        Ok(key) => Ok(key),
        Err(russh::keys::Error::KeyIsEncrypted) => {
            let passphrase = Password::new()
                .with_prompt(format!("Enter passphrase for {}", path.display()))
                .allow_empty_password(true)
                .interact()
                .context("Failed to read passphrase")?;

            russh::keys::load_secret_key(path, Some(&passphrase))
                .with_context(|| format!("Failed to decrypt SSH private key {:?}", path))
        }
        Err(e) => Err(e).with_context(|| {
            format!(
                "Failed to load SSH private key {:?} (make sure it is not the .pub file)",
                path
            )
        }),
    }
}

/// Resolve credentials from the configuration
///
/// Password auth uses the configured password or prompts for one. Key auth
/// uses `key_file` or the first key discovered in `~/.ssh`.
pub fn resolve_credentials(config: &SshConfig) -> Result<SshAuth> {
    match config.auth {
        SshAuthKind::Password => {
            let password = match &config.password {
                Some(password) => password.clone(),
                None => Password::new()
                    .with_prompt(format!("Enter SSH password for {}", config.user))
                    .allow_empty_password(true)
                    .interact()
                    .context("Failed to read password")?,
            };
            Ok(SshAuth::Password(password))
        }
        SshAuthKind::Key => {
            let path = match &config.key_file {
                Some(path) => path.clone(),
                None => find_ssh_key().inspect_err(|_| {
                    warn!("Specify a key with --key or enable password auth with -p");
                })?,
            };

            info!("Using SSH key: {}", path.display());
            let key = load_private_key(&path)?;

            Ok(SshAuth::PublicKey {
                path,
                key: Arc::new(key),
            })
        }
    }
}
