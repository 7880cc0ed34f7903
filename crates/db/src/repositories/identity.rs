use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use secrecy::ExposeSecret;
use sqlx::Row;
use uuid::Uuid;

use assetmap_core::storage::{
    AdminUser, Credentials, IdentityStore, Session, SessionToken, StoreError,
};

use super::{decode_err, parse_timestamp, timestamp, RepositoryError};
use crate::DbPool;

/// Admin accounts and bearer sessions backed by SQLite. Passwords are stored as argon2id
/// PHC strings.
pub struct SqlIdentityStore {
    pool: DbPool,
    ttl: Duration,
}

impl SqlIdentityStore {
    pub fn new(pool: DbPool, ttl: Duration) -> Self {
        Self { pool, ttl }
    }

    /// Removes sessions that expired before now. Returns how many were dropped.
    pub async fn purge_expired(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM admin_sessions WHERE expires_at <= ?")
            .bind(timestamp(Utc::now()))
            .execute(&self.pool)
            .await
            .map_err(RepositoryError::from)?;
        Ok(result.rows_affected())
    }

    pub async fn find_user(&self, email: &str) -> Result<Option<AdminUser>, StoreError> {
        let row = sqlx::query("SELECT id, email, created_at FROM admin_users WHERE email = ?")
            .bind(normalize_email(email))
            .fetch_optional(&self.pool)
            .await
            .map_err(RepositoryError::from)?;

        match row {
            Some(ref row) => Ok(Some(row_to_user(row, "")?)),
            None => Ok(None),
        }
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn hash_password(password: &str) -> Result<String, StoreError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|error| StoreError::Backend(format!("password hashing failed: {error}")))
}

fn verify_password(password: &str, stored: &str) -> bool {
    match PasswordHash::new(stored) {
        Ok(parsed) => Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok(),
        Err(_) => false,
    }
}

/// Reads an admin user from a row whose columns carry `prefix`.
fn row_to_user(row: &sqlx::sqlite::SqliteRow, prefix: &str) -> Result<AdminUser, RepositoryError> {
    let id: String = row.try_get(format!("{prefix}id").as_str()).map_err(decode_err)?;
    let email: String = row.try_get(format!("{prefix}email").as_str()).map_err(decode_err)?;
    let created_at: String =
        row.try_get(format!("{prefix}created_at").as_str()).map_err(decode_err)?;
    Ok(AdminUser { id, email, created_at: parse_timestamp("created_at", &created_at)? })
}

#[async_trait]
impl IdentityStore for SqlIdentityStore {
    async fn sign_up(&self, credentials: &Credentials) -> Result<AdminUser, StoreError> {
        let email = normalize_email(&credentials.email);
        if self.find_user(&email).await?.is_some() {
            return Err(StoreError::Conflict(format!("an account for `{email}` already exists")));
        }

        let password_hash = hash_password(credentials.password.expose_secret())?;
        let user = AdminUser { id: Uuid::new_v4().to_string(), email, created_at: Utc::now() };
        sqlx::query(
            "INSERT INTO admin_users (id, email, password_hash, created_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(&user.id)
        .bind(&user.email)
        .bind(&password_hash)
        .bind(timestamp(user.created_at))
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        tracing::info!(event_name = "admin.user_created", user_id = %user.id, "admin account created");
        Ok(user)
    }

    async fn sign_in(&self, credentials: &Credentials) -> Result<Session, StoreError> {
        let row = sqlx::query(
            "SELECT id, email, created_at, password_hash
             FROM admin_users WHERE email = ?",
        )
        .bind(normalize_email(&credentials.email))
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::from)?
        .ok_or(StoreError::InvalidCredentials)?;

        let stored: String = row.try_get("password_hash").map_err(decode_err)?;
        if !verify_password(credentials.password.expose_secret(), &stored) {
            return Err(StoreError::InvalidCredentials);
        }

        let user = row_to_user(&row, "")?;
        let now = Utc::now();
        let session = Session { token: SessionToken::generate(), user, expires_at: now + self.ttl };
        sqlx::query(
            "INSERT INTO admin_sessions (token, user_id, expires_at, created_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(&session.token.0)
        .bind(&session.user.id)
        .bind(timestamp(session.expires_at))
        .bind(timestamp(now))
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        Ok(session)
    }

    async fn session(&self, token: &SessionToken) -> Result<Option<Session>, StoreError> {
        let row = sqlx::query(
            "SELECT s.token, s.expires_at, u.id AS user_id, u.email AS user_email,
                    u.created_at AS user_created_at
             FROM admin_sessions s
             JOIN admin_users u ON u.id = s.user_id
             WHERE s.token = ? AND s.expires_at > ?",
        )
        .bind(&token.0)
        .bind(timestamp(Utc::now()))
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let expires_at: String = row.try_get("expires_at").map_err(decode_err)?;
        Ok(Some(Session {
            token: token.clone(),
            user: row_to_user(&row, "user_")?,
            expires_at: parse_timestamp("expires_at", &expires_at)?,
        }))
    }

    async fn sign_out(&self, token: &SessionToken) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM admin_sessions WHERE token = ?")
            .bind(&token.0)
            .execute(&self.pool)
            .await
            .map_err(RepositoryError::from)?;
        Ok(())
    }
}
