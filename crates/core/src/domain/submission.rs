use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog::AssetKey;
use crate::domain::asset::{AssetBlock, ImageRef};
use crate::domain::employee::{Employee, Job};
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubmissionId(pub String);

impl SubmissionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

/// The in-progress record of one wizard run. Only the wizard mutates it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionDraft {
    employee: Option<Employee>,
    job: Option<Job>,
    selected: Vec<AssetKey>,
    asset_details: BTreeMap<AssetKey, AssetBlock>,
    confirmed: bool,
}

impl SubmissionDraft {
    pub fn employee(&self) -> Option<&Employee> {
        self.employee.as_ref()
    }

    pub fn job(&self) -> Option<&Job> {
        self.job.as_ref()
    }

    /// Selected asset types in the order they were picked.
    pub fn selected(&self) -> &[AssetKey] {
        &self.selected
    }

    pub fn asset_details(&self) -> &BTreeMap<AssetKey, AssetBlock> {
        &self.asset_details
    }

    pub fn confirmed(&self) -> bool {
        self.confirmed
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub(crate) fn set_employee(&mut self, employee: Employee) {
        self.employee = Some(employee);
    }

    pub(crate) fn set_job(&mut self, job: Job) {
        self.job = Some(job);
    }

    /// Replaces the selection and drops details for types that are no longer selected.
    pub(crate) fn set_selection(&mut self, selected: Vec<AssetKey>) {
        self.asset_details.retain(|key, _| selected.contains(key));
        self.selected = selected;
    }

    pub(crate) fn set_asset_details(&mut self, details: BTreeMap<AssetKey, AssetBlock>) {
        self.asset_details = details;
    }

    pub(crate) fn set_confirmed(&mut self, confirmed: bool) {
        self.confirmed = confirmed;
    }

    /// Every step slice present and one asset block per selected type, no strays.
    pub fn ensure_complete(&self) -> Result<(), DomainError> {
        let mut missing = Vec::new();
        if self.employee.is_none() {
            missing.push("employee".to_string());
        }
        if self.job.is_none() {
            missing.push("job".to_string());
        }
        if self.selected.is_empty() {
            missing.push("selected_assets".to_string());
        }
        missing.extend(
            self.selected
                .iter()
                .filter(|key| !self.asset_details.contains_key(key))
                .map(|key| format!("asset_details.{key}")),
        );
        if !missing.is_empty() {
            return Err(DomainError::IncompleteSubmission { missing });
        }

        if let Some(stray) = self.asset_details.keys().find(|key| !self.selected.contains(key)) {
            return Err(DomainError::InvariantViolation(format!(
                "asset details present for unselected type `{stray}`"
            )));
        }

        Ok(())
    }
}

/// Flat submission row as written to the record store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub employee_name: String,
    pub employee_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employee_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employee_email: Option<String>,
    pub company: String,
    pub department: String,
    pub designation: String,
    pub selected_assets: Vec<String>,
    pub asset_details: BTreeMap<String, AssetBlock>,
    pub confirmed: bool,
}

impl SubmissionRecord {
    pub fn contact(&self) -> &str {
        self.employee_number.as_deref().or(self.employee_email.as_deref()).unwrap_or_default()
    }

    pub fn images(&self) -> impl Iterator<Item = &ImageRef> + '_ {
        self.asset_details.values().flat_map(AssetBlock::images)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSubmission {
    pub id: SubmissionId,
    #[serde(flatten)]
    pub record: SubmissionRecord,
    pub created_at: DateTime<Utc>,
}
