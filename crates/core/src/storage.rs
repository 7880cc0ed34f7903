//! Collaborator ports: record store, object store and admin identity store.
//!
//! The SQLite and filesystem adapters live in `assetmap-db`; the in-memory versions
//! here back unit tests and the server's ephemeral mode.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::domain::asset::ImageRef;
use crate::domain::submission::{StoredSubmission, SubmissionId, SubmissionRecord};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("backend failure: {0}")]
    Backend(String),
}

/// Listing filter. Text search is case-insensitive over name, employee id, contact
/// and designation; the other fields match exactly.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionQuery {
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub asset: Option<String>,
    #[serde(default)]
    pub limit: Option<u32>,
}

impl SubmissionQuery {
    pub fn matches(&self, submission: &StoredSubmission) -> bool {
        let record = &submission.record;
        let search_hit = match non_blank(&self.search) {
            Some(needle) => {
                let needle = needle.to_lowercase();
                [
                    record.employee_name.as_str(),
                    record.employee_id.as_str(),
                    record.contact(),
                    record.designation.as_str(),
                ]
                .iter()
                .any(|haystack| haystack.to_lowercase().contains(&needle))
            }
            None => true,
        };

        search_hit
            && non_blank(&self.company).map_or(true, |company| record.company == company)
            && non_blank(&self.department).map_or(true, |department| record.department == department)
            && non_blank(&self.asset)
                .map_or(true, |asset| record.selected_assets.iter().any(|label| label == asset))
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|value| !value.is_empty())
}

#[async_trait]
pub trait SubmissionStore: Send + Sync {
    async fn insert(&self, record: SubmissionRecord) -> Result<StoredSubmission, StoreError>;
    /// Newest first.
    async fn list(&self, query: &SubmissionQuery) -> Result<Vec<StoredSubmission>, StoreError>;
    async fn get(&self, id: &SubmissionId) -> Result<Option<StoredSubmission>, StoreError>;
    /// Returns whether a row was removed.
    async fn delete(&self, id: &SubmissionId) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn upload(
        &self,
        name: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<ImageRef, StoreError>;
    fn public_url(&self, name: &str) -> ImageRef;
}

pub struct Credentials {
    pub email: String,
    pub password: SecretString,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self { email: email.into(), password: SecretString::from(password.into()) }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(pub String);

impl SessionToken {
    pub fn generate() -> Self {
        let token = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(48)
            .map(char::from)
            .collect::<String>();
        Self(token)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminUser {
    pub id: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub token: SessionToken,
    pub user: AdminUser,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn sign_up(&self, credentials: &Credentials) -> Result<AdminUser, StoreError>;
    async fn sign_in(&self, credentials: &Credentials) -> Result<Session, StoreError>;
    /// Live session for `token`, or `None` if unknown or expired.
    async fn session(&self, token: &SessionToken) -> Result<Option<Session>, StoreError>;
    async fn sign_out(&self, token: &SessionToken) -> Result<(), StoreError>;
}

#[derive(Clone, Default)]
pub struct InMemorySubmissionStore {
    rows: Arc<RwLock<Vec<StoredSubmission>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemorySubmissionStore {
    /// Makes every call fail with `StoreError::Unavailable` until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("submission store is offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl SubmissionStore for InMemorySubmissionStore {
    async fn insert(&self, record: SubmissionRecord) -> Result<StoredSubmission, StoreError> {
        self.check_available()?;
        let stored = StoredSubmission { id: SubmissionId::generate(), record, created_at: Utc::now() };
        self.rows.write().await.push(stored.clone());
        Ok(stored)
    }

    async fn list(&self, query: &SubmissionQuery) -> Result<Vec<StoredSubmission>, StoreError> {
        self.check_available()?;
        let rows = self.rows.read().await;
        let mut matching =
            rows.iter().filter(|row| query.matches(row)).cloned().collect::<Vec<_>>();
        // Insertion order breaks ties between equal timestamps.
        matching.reverse();
        matching.sort_by(|left, right| right.created_at.cmp(&left.created_at));
        if let Some(limit) = query.limit {
            matching.truncate(limit as usize);
        }
        Ok(matching)
    }

    async fn get(&self, id: &SubmissionId) -> Result<Option<StoredSubmission>, StoreError> {
        self.check_available()?;
        Ok(self.rows.read().await.iter().find(|row| &row.id == id).cloned())
    }

    async fn delete(&self, id: &SubmissionId) -> Result<bool, StoreError> {
        self.check_available()?;
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|row| &row.id != id);
        Ok(rows.len() != before)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

#[derive(Clone)]
pub struct InMemoryObjectStore {
    base_url: String,
    objects: Arc<RwLock<HashMap<String, StoredObject>>>,
    failing_names: Arc<RwLock<Vec<String>>>,
}

impl InMemoryObjectStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            objects: Arc::default(),
            failing_names: Arc::default(),
        }
    }

    /// Uploads whose object name contains `fragment` fail.
    pub async fn fail_names_containing(&self, fragment: impl Into<String>) {
        self.failing_names.write().await.push(fragment.into());
    }

    pub async fn object(&self, name: &str) -> Option<StoredObject> {
        self.objects.read().await.get(name).cloned()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new("memory://asset-images")
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn upload(
        &self,
        name: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<ImageRef, StoreError> {
        if self.failing_names.read().await.iter().any(|fragment| name.contains(fragment.as_str())) {
            return Err(StoreError::Backend(format!("object `{name}` was rejected")));
        }
        let mut objects = self.objects.write().await;
        if objects.contains_key(name) {
            return Err(StoreError::Conflict(format!("object `{name}` already exists")));
        }
        objects.insert(
            name.to_string(),
            StoredObject { bytes, content_type: content_type.to_string() },
        );
        Ok(self.public_url(name))
    }

    fn public_url(&self, name: &str) -> ImageRef {
        ImageRef(format!("{}/{name}", self.base_url))
    }
}

struct MemoryAccount {
    user: AdminUser,
    password: SecretString,
}

#[derive(Clone)]
pub struct InMemoryIdentityStore {
    ttl: Duration,
    accounts: Arc<RwLock<HashMap<String, MemoryAccount>>>,
    sessions: Arc<RwLock<HashMap<SessionToken, Session>>>,
}

impl InMemoryIdentityStore {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, accounts: Arc::default(), sessions: Arc::default() }
    }
}

impl Default for InMemoryIdentityStore {
    fn default() -> Self {
        Self::new(Duration::hours(8))
    }
}

#[async_trait]
impl IdentityStore for InMemoryIdentityStore {
    async fn sign_up(&self, credentials: &Credentials) -> Result<AdminUser, StoreError> {
        let email = credentials.email.trim().to_lowercase();
        let mut accounts = self.accounts.write().await;
        if accounts.contains_key(&email) {
            return Err(StoreError::Conflict(format!("an account for `{email}` already exists")));
        }
        let user =
            AdminUser { id: uuid::Uuid::new_v4().to_string(), email: email.clone(), created_at: Utc::now() };
        accounts.insert(
            email,
            MemoryAccount { user: user.clone(), password: credentials.password.clone() },
        );
        Ok(user)
    }

    async fn sign_in(&self, credentials: &Credentials) -> Result<Session, StoreError> {
        let email = credentials.email.trim().to_lowercase();
        let accounts = self.accounts.read().await;
        let account = accounts.get(&email).ok_or(StoreError::InvalidCredentials)?;
        if account.password.expose_secret() != credentials.password.expose_secret() {
            return Err(StoreError::InvalidCredentials);
        }
        let session = Session {
            token: SessionToken::generate(),
            user: account.user.clone(),
            expires_at: Utc::now() + self.ttl,
        };
        self.sessions.write().await.insert(session.token.clone(), session.clone());
        Ok(session)
    }

    async fn session(&self, token: &SessionToken) -> Result<Option<Session>, StoreError> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(token).filter(|session| !session.is_expired(Utc::now())).cloned())
    }

    async fn sign_out(&self, token: &SessionToken) -> Result<(), StoreError> {
        self.sessions.write().await.remove(token);
        Ok(())
    }
}
