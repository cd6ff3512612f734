use std::collections::HashMap;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use password_hash::{PasswordHash, SaltString};
use serde::{Deserialize, Serialize};

use crate::tprintln;

/// Credentials as submitted to `POST /login`.
#[derive(Clone, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRequest").field("username", &self.username).field("password", &"<redacted>").finish()
    }
}

/// External store that owns user secrets. Only answers yes or no.
pub trait CredentialStore: Send + Sync {
    fn verify(&self, username: &str, password: &str) -> bool;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub username: String,
    pub password_hash: String,
}

/// Argon2 PHC hashes kept in memory, loaded from a JSON users file.
pub struct LocalCredentialStore {
    users: HashMap<String, String>,
    // Verified against for unknown users so both failure paths cost one Argon2 run.
    decoy_hash: String,
}

impl LocalCredentialStore {
    pub fn from_records(records: Vec<UserRecord>) -> Result<Self> {
        let mut users = HashMap::with_capacity(records.len());
        for r in records {
            PasswordHash::new(&r.password_hash)
                .map_err(|e| anyhow!("user {}: invalid password hash: {}", r.username, e))?;
            if users.insert(r.username.clone(), r.password_hash).is_some() {
                return Err(anyhow!("duplicate user {}", r.username));
            }
        }
        Ok(Self { users, decoy_hash: hash_password("gatehouse-decoy")? })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading users file {}", path.display()))?;
        let records: Vec<UserRecord> = serde_json::from_str(&text)
            .with_context(|| format!("parsing users file {}", path.display()))?;
        let store = Self::from_records(records)?;
        tracing::info!(target: "auth", users = store.users.len(), "loaded credential store from {}", path.display());
        Ok(store)
    }

    pub fn len(&self) -> usize { self.users.len() }

    pub fn is_empty(&self) -> bool { self.users.is_empty() }
}

impl CredentialStore for LocalCredentialStore {
    fn verify(&self, username: &str, password: &str) -> bool {
        match self.users.get(username) {
            Some(hash) => verify_password(hash, password),
            None => {
                let _ = verify_password(&self.decoy_hash, password);
                tprintln!("auth.verify unknown user={}", username);
                false
            }
        }
    }
}

pub fn hash_password(password: &str) -> Result<String> {
    let mut salt_bytes = [0u8; 16];
    getrandom::getrandom(&mut salt_bytes).map_err(|e| anyhow!(e.to_string()))?;
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| anyhow!(e.to_string()))?;
    let argon2 = Argon2::default();
    let phc = argon2.hash_password(password.as_bytes(), &salt).map_err(|e| anyhow!(e.to_string()))?.to_string();
    Ok(phc)
}

pub fn verify_password(hash: &str, password: &str) -> bool {
    if let Ok(parsed) = PasswordHash::new(hash) {
        let argon2 = Argon2::default();
        argon2.verify_password(password.as_bytes(), &parsed).is_ok()
    } else { false }
}

/// Write a demo users file (`alice`/`alice`, `bob`/`bob`) when none exists.
pub fn ensure_default_users(path: &Path) -> Result<()> {
    if path.exists() { return Ok(()); }
    let records = ["alice", "bob"]
        .iter()
        .map(|u| Ok(UserRecord { username: u.to_string(), password_hash: hash_password(u)? }))
        .collect::<Result<Vec<_>>>()?;
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() { std::fs::create_dir_all(dir)?; }
    }
    std::fs::write(path, serde_json::to_string_pretty(&records)?)
        .with_context(|| format!("writing users file {}", path.display()))?;
    tracing::warn!(target: "auth", "created demo users file {} (alice, bob)", path.display());
    Ok(())
}
