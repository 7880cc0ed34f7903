use std::sync::Arc;

use thiserror::Error;

use crate::catalog::AssetCatalog;
use crate::domain::employee::Contact;
use crate::domain::submission::{SubmissionDraft, SubmissionId, SubmissionRecord};
use crate::errors::{ApplicationError, DomainError};
use crate::storage::{StoreError, SubmissionStore};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FinalizeError {
    #[error("submission must be confirmed before it is submitted")]
    NotConfirmed,
    #[error(transparent)]
    Incomplete(#[from] DomainError),
    #[error("could not save the submission: {0}")]
    Store(#[from] StoreError),
}

impl From<FinalizeError> for ApplicationError {
    fn from(value: FinalizeError) -> Self {
        match value {
            FinalizeError::NotConfirmed => {
                Self::Validation(FinalizeError::NotConfirmed.to_string())
            }
            FinalizeError::Incomplete(error) => Self::Domain(error),
            FinalizeError::Store(error) => Self::Persistence(error.to_string()),
        }
    }
}

/// Maps a confirmed draft onto the flat record and writes it to the record store.
#[derive(Clone)]
pub struct SubmissionFinalizer {
    store: Arc<dyn SubmissionStore>,
    catalog: Arc<AssetCatalog>,
}

impl SubmissionFinalizer {
    pub fn new(store: Arc<dyn SubmissionStore>, catalog: Arc<AssetCatalog>) -> Self {
        Self { store, catalog }
    }

    pub fn to_record(&self, draft: &SubmissionDraft) -> Result<SubmissionRecord, FinalizeError> {
        if !draft.confirmed() {
            return Err(FinalizeError::NotConfirmed);
        }
        draft.ensure_complete()?;

        let (Some(employee), Some(job)) = (draft.employee(), draft.job()) else {
            return Err(DomainError::InvariantViolation(
                "complete draft without employee or job".to_string(),
            )
            .into());
        };

        let (employee_number, employee_email) = match &employee.contact {
            Contact::Phone(number) => (Some(number.clone()), None),
            Contact::Email(email) => (None, Some(email.clone())),
        };

        Ok(SubmissionRecord {
            employee_name: employee.full_name.clone(),
            employee_id: employee.employee_id.clone(),
            employee_number,
            employee_email,
            company: job.company.clone(),
            department: job.department.clone(),
            designation: job.designation.clone(),
            selected_assets: draft
                .selected()
                .iter()
                .map(|key| self.catalog.label_of(key).to_string())
                .collect(),
            asset_details: draft
                .asset_details()
                .iter()
                .map(|(key, block)| (key.to_string(), block.clone()))
                .collect(),
            confirmed: true,
        })
    }

    pub async fn finalize(&self, draft: &SubmissionDraft) -> Result<SubmissionId, FinalizeError> {
        let record = self.to_record(draft)?;
        let stored = self.store.insert(record).await?;
        tracing::info!(
            event_name = "submission.persisted",
            submission_id = %stored.id.0,
            assets = stored.record.selected_assets.len(),
            "submission persisted"
        );
        Ok(stored.id)
    }
}
