//! Session-guarded administration of persisted submissions.

use std::collections::BTreeMap;
use std::sync::Arc;

use secrecy::ExposeSecret;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::catalog::AssetCatalog;
use crate::domain::submission::{StoredSubmission, SubmissionId};
use crate::errors::ApplicationError;
use crate::export::{export_csv, ExportError};
use crate::schema::{is_email, FieldErrors};
use crate::storage::{
    AdminUser, Credentials, IdentityStore, Session, SessionToken, StoreError, SubmissionQuery,
    SubmissionStore,
};

pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("invalid credentials input")]
    InvalidInput(FieldErrors),
    #[error("sign in to continue")]
    Unauthenticated,
    #[error("submission `{0}` was not found")]
    NotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Export(#[from] ExportError),
}

impl From<AdminError> for ApplicationError {
    fn from(value: AdminError) -> Self {
        match value {
            AdminError::InvalidInput(errors) => Self::Validation(
                errors.values().cloned().collect::<Vec<_>>().join("; "),
            ),
            AdminError::Unauthenticated => Self::Unauthenticated("no active session".to_string()),
            AdminError::NotFound(id) => Self::NotFound(format!("submission `{id}`")),
            AdminError::Store(StoreError::InvalidCredentials) => {
                Self::Unauthenticated(StoreError::InvalidCredentials.to_string())
            }
            AdminError::Store(StoreError::Conflict(message)) => Self::Validation(message),
            AdminError::Store(StoreError::NotFound(message)) => Self::NotFound(message),
            AdminError::Store(error) => Self::Persistence(error.to_string()),
            AdminError::Export(error) => Self::Integration(error.to_string()),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionStats {
    pub total: usize,
    pub by_company: BTreeMap<String, usize>,
    pub by_department: BTreeMap<String, usize>,
    pub by_asset: BTreeMap<String, usize>,
    pub total_images: usize,
}

impl SubmissionStats {
    pub fn from_submissions(submissions: &[StoredSubmission]) -> Self {
        let mut stats = Self { total: submissions.len(), ..Self::default() };
        for submission in submissions {
            let record = &submission.record;
            *stats.by_company.entry(record.company.clone()).or_default() += 1;
            *stats.by_department.entry(record.department.clone()).or_default() += 1;
            for label in &record.selected_assets {
                *stats.by_asset.entry(label.clone()).or_default() += 1;
            }
            stats.total_images += record.images().count();
        }
        stats
    }
}

/// Checks email shape and minimum password length before the identity store is asked.
pub fn validate_credentials(credentials: &Credentials) -> Result<(), AdminError> {
    let mut errors = FieldErrors::new();
    if !is_email(credentials.email.trim()) {
        errors.insert("email".to_string(), "Enter a valid email address".to_string());
    }
    if credentials.password.expose_secret().chars().count() < MIN_PASSWORD_LEN {
        errors.insert(
            "password".to_string(),
            format!("Password must be at least {MIN_PASSWORD_LEN} characters"),
        );
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(AdminError::InvalidInput(errors))
    }
}

pub struct AdminConsole {
    submissions: Arc<dyn SubmissionStore>,
    identity: Arc<dyn IdentityStore>,
    catalog: Arc<AssetCatalog>,
    audit_sink: Arc<dyn AuditSink>,
    session_tx: watch::Sender<Option<Session>>,
}

impl AdminConsole {
    pub fn new(
        submissions: Arc<dyn SubmissionStore>,
        identity: Arc<dyn IdentityStore>,
        catalog: Arc<AssetCatalog>,
        audit_sink: Arc<dyn AuditSink>,
    ) -> Self {
        let (session_tx, _) = watch::channel(None);
        Self { submissions, identity, catalog, audit_sink, session_tx }
    }

    /// Fires on every sign-in and sign-out.
    pub fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.session_tx.subscribe()
    }

    /// Most recent session established through this console, if still signed in.
    pub fn current_session(&self) -> Option<Session> {
        self.session_tx.borrow().clone()
    }

    pub async fn sign_up(
        &self,
        credentials: &Credentials,
        correlation_id: &str,
    ) -> Result<AdminUser, AdminError> {
        validate_credentials(credentials)?;
        let result = self.identity.sign_up(credentials).await;
        self.audit("admin.sign_up", correlation_id, result.is_ok(), &credentials.email);
        Ok(result?)
    }

    pub async fn sign_in(
        &self,
        credentials: &Credentials,
        correlation_id: &str,
    ) -> Result<Session, AdminError> {
        validate_credentials(credentials)?;
        let result = self.identity.sign_in(credentials).await;
        self.audit("admin.sign_in", correlation_id, result.is_ok(), &credentials.email);
        let session = result?;
        self.session_tx.send_replace(Some(session.clone()));
        Ok(session)
    }

    pub async fn sign_out(&self, token: &SessionToken, correlation_id: &str) -> Result<(), AdminError> {
        self.identity.sign_out(token).await?;
        self.session_tx.send_if_modified(|current| {
            if current.as_ref().is_some_and(|session| &session.token == token) {
                *current = None;
                true
            } else {
                false
            }
        });
        self.audit("admin.sign_out", correlation_id, true, "-");
        Ok(())
    }

    /// The live session for `token`.
    pub async fn session(&self, token: &SessionToken) -> Result<Session, AdminError> {
        self.identity.session(token).await?.ok_or(AdminError::Unauthenticated)
    }

    pub async fn list(
        &self,
        token: &SessionToken,
        query: &SubmissionQuery,
    ) -> Result<Vec<StoredSubmission>, AdminError> {
        self.session(token).await?;
        Ok(self.submissions.list(query).await?)
    }

    pub async fn get(
        &self,
        token: &SessionToken,
        id: &SubmissionId,
    ) -> Result<StoredSubmission, AdminError> {
        self.session(token).await?;
        self.submissions.get(id).await?.ok_or_else(|| AdminError::NotFound(id.0.clone()))
    }

    pub async fn delete(
        &self,
        token: &SessionToken,
        id: &SubmissionId,
        correlation_id: &str,
    ) -> Result<(), AdminError> {
        let session = self.session(token).await?;
        let removed = self.submissions.delete(id).await?;
        self.audit_sink.emit(
            AuditEvent::new(
                &AuditContext::new(None, Some(id.clone()), correlation_id, session.user.email),
                "admin.submission_deleted",
                AuditCategory::Admin,
                if removed { AuditOutcome::Success } else { AuditOutcome::Rejected },
            ),
        );
        if removed {
            Ok(())
        } else {
            Err(AdminError::NotFound(id.0.clone()))
        }
    }

    pub async fn stats(
        &self,
        token: &SessionToken,
        query: &SubmissionQuery,
    ) -> Result<SubmissionStats, AdminError> {
        let submissions = self.list(token, query).await?;
        Ok(SubmissionStats::from_submissions(&submissions))
    }

    pub async fn export_csv(
        &self,
        token: &SessionToken,
        query: &SubmissionQuery,
    ) -> Result<String, AdminError> {
        let submissions = self.list(token, query).await?;
        Ok(export_csv(&self.catalog, &submissions)?)
    }

    fn audit(&self, event_type: &str, correlation_id: &str, succeeded: bool, actor: &str) {
        let outcome = if succeeded { AuditOutcome::Success } else { AuditOutcome::Rejected };
        self.audit_sink.emit(AuditEvent::new(
            &AuditContext::new(None, None, correlation_id, actor.trim().to_lowercase()),
            event_type,
            AuditCategory::Admin,
            outcome,
        ));
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use crate::audit::InMemoryAuditSink;
    use crate::catalog::AssetCatalog;
    use crate::domain::asset::{AssetBlock, ComputerBlock, ImageRef};
    use crate::domain::submission::{SubmissionId, SubmissionRecord};
    use crate::storage::{
        Credentials, InMemoryIdentityStore, InMemorySubmissionStore, SessionToken,
        SubmissionQuery, SubmissionStore,
    };

    use super::{AdminConsole, AdminError};

    const REQ: &str = "req-admin";

    fn record(company: &str) -> SubmissionRecord {
        SubmissionRecord {
            employee_name: "Jane Roe".to_string(),
            employee_id: "EMP-100".to_string(),
            employee_number: Some("9123456789".to_string()),
            employee_email: None,
            company: company.to_string(),
            department: "IT".to_string(),
            designation: "Engineer".to_string(),
            selected_assets: vec!["Laptop".to_string()],
            asset_details: BTreeMap::from([(
                "laptop".to_string(),
                AssetBlock::Computer(ComputerBlock {
                    brand: "Dell".to_string(),
                    serial_number: "SN123".to_string(),
                    accessories: Default::default(),
                    images: vec![
                        ImageRef("https://cdn.example/a.png".to_string()),
                        ImageRef("https://cdn.example/b.png".to_string()),
                    ],
                }),
            )]),
            confirmed: true,
        }
    }

    fn console(store: &InMemorySubmissionStore, sink: &InMemoryAuditSink) -> AdminConsole {
        AdminConsole::new(
            Arc::new(store.clone()),
            Arc::new(InMemoryIdentityStore::default()),
            Arc::new(AssetCatalog::default()),
            Arc::new(sink.clone()),
        )
    }

    #[tokio::test]
    async fn operations_require_a_session() {
        let store = InMemorySubmissionStore::default();
        let console = console(&store, &InMemoryAuditSink::default());
        let token = SessionToken("forged".to_string());

        assert!(matches!(
            console.list(&token, &SubmissionQuery::default()).await,
            Err(AdminError::Unauthenticated)
        ));
        assert!(matches!(
            console.delete(&token, &SubmissionId("x".to_string()), REQ).await,
            Err(AdminError::Unauthenticated)
        ));
        assert!(matches!(
            console.export_csv(&token, &SubmissionQuery::default()).await,
            Err(AdminError::Unauthenticated)
        ));
    }

    #[tokio::test]
    async fn credentials_are_validated_before_the_identity_store() {
        let console =
            console(&InMemorySubmissionStore::default(), &InMemoryAuditSink::default());

        let error = console
            .sign_up(&Credentials::new("not-an-email", "12345"), REQ)
            .await
            .expect_err("invalid input");

        match error {
            AdminError::InvalidInput(errors) => {
                assert!(errors.contains_key("email"));
                assert!(errors.contains_key("password"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn signed_in_admin_can_list_summarise_and_delete() {
        let store = InMemorySubmissionStore::default();
        let sink = InMemoryAuditSink::default();
        let console = console(&store, &sink);
        let mut changes = console.subscribe();
        store.insert(record("AUTOZONE")).await.expect("insert");
        let second = store.insert(record("VERAVITA")).await.expect("insert");

        console.sign_up(&Credentials::new("admin@company.com", "secret1"), REQ).await.expect("up");
        let session =
            console.sign_in(&Credentials::new("admin@company.com", "secret1"), REQ).await.expect("in");
        assert!(changes.has_changed().expect("channel open"));
        assert_eq!(changes.borrow_and_update().as_ref().map(|s| s.user.email.as_str()), Some("admin@company.com"));

        let stats = console.stats(&session.token, &SubmissionQuery::default()).await.expect("stats");
        assert_eq!(stats.total, 2);
        assert_eq!(stats.by_company.get("VERAVITA"), Some(&1));
        assert_eq!(stats.by_asset.get("Laptop"), Some(&2));
        assert_eq!(stats.total_images, 4);

        console.delete(&session.token, &second.id, REQ).await.expect("delete");
        assert!(matches!(
            console.get(&session.token, &second.id).await,
            Err(AdminError::NotFound(_))
        ));
        assert!(matches!(
            console.delete(&session.token, &second.id, REQ).await,
            Err(AdminError::NotFound(_))
        ));

        let csv = console.export_csv(&session.token, &SubmissionQuery::default()).await.expect("csv");
        assert_eq!(csv.lines().count(), 2);

        console.sign_out(&session.token, REQ).await.expect("sign out");
        assert!(console.current_session().is_none());
        assert!(matches!(
            console.list(&session.token, &SubmissionQuery::default()).await,
            Err(AdminError::Unauthenticated)
        ));
        assert!(sink.events().iter().any(|event| event.event_type == "admin.submission_deleted"));
    }
}
