//! In-memory directory and identity fixtures for tests and local runs.

use async_trait::async_trait;
use secrecy::SecretString;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use super::{AdminDirectory, AdminPrincipal, AuthError, IdentityProvider};
use crate::rbac::AdminRole;

/// Directory backed by a process-local map.
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    admins: Mutex<HashMap<Uuid, AdminPrincipal>>,
}

impl MemoryDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an active admin; returns its id.
    pub fn insert_admin(&self, email: &str, role: AdminRole, two_factor_enabled: bool) -> Uuid {
        let id = Uuid::new_v4();
        self.insert(AdminPrincipal {
            id,
            email: email.to_string(),
            role,
            is_active: true,
            two_factor_enabled,
            two_factor_secret: None,
        });
        id
    }

    pub fn insert(&self, principal: AdminPrincipal) {
        if let Ok(mut admins) = self.admins.lock() {
            admins.insert(principal.id, principal);
        }
    }

    pub fn set_active(&self, id: Uuid, is_active: bool) {
        if let Ok(mut admins) = self.admins.lock() {
            if let Some(principal) = admins.get_mut(&id) {
                principal.is_active = is_active;
            }
        }
    }

    pub fn set_two_factor_secret(&self, id: Uuid, secret: &str) {
        if let Ok(mut admins) = self.admins.lock() {
            if let Some(principal) = admins.get_mut(&id) {
                principal.two_factor_enabled = true;
                principal.two_factor_secret = Some(SecretString::from(secret.to_string()));
            }
        }
    }

    /// Synchronous profile snapshot for test setup.
    #[must_use]
    pub fn snapshot(&self, id: Uuid) -> Option<AdminPrincipal> {
        self.admins
            .lock()
            .ok()
            .and_then(|admins| admins.get(&id).cloned())
    }

    pub fn remove(&self, id: Uuid) {
        if let Ok(mut admins) = self.admins.lock() {
            admins.remove(&id);
        }
    }
}

#[async_trait]
impl AdminDirectory for MemoryDirectory {
    async fn get_by_id(&self, id: Uuid) -> anyhow::Result<Option<AdminPrincipal>> {
        let admins = self
            .admins
            .lock()
            .map_err(|_| anyhow::anyhow!("directory store poisoned"))?;
        Ok(admins.get(&id).cloned())
    }
}

/// Identity provider backed by a process-local credential map.
#[derive(Debug, Default)]
pub struct MemoryIdentity {
    credentials: Mutex<HashMap<String, (Uuid, String)>>,
}

impl MemoryIdentity {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, id: Uuid, email: &str, password: &str) {
        if let Ok(mut credentials) = self.credentials.lock() {
            credentials.insert(email.to_lowercase(), (id, password.to_string()));
        }
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentity {
    async fn verify_credentials(&self, email: &str, password: &str) -> Result<Uuid, AuthError> {
        let credentials = self
            .credentials
            .lock()
            .map_err(|_| AuthError::Provider(anyhow::anyhow!("credential store poisoned")))?;
        match credentials.get(&email.trim().to_lowercase()) {
            Some((id, stored)) if stored == password => Ok(*id),
            _ => Err(AuthError::InvalidCredentials),
        }
    }
}
