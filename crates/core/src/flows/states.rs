use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowType {
    AssetIntake,
}

impl FlowType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AssetIntake => "asset_intake",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardStep {
    Employee,
    Job,
    AssetSelection,
    AssetDetails,
    Review,
    Success,
}

impl WizardStep {
    pub const ORDERED: [WizardStep; 6] = [
        WizardStep::Employee,
        WizardStep::Job,
        WizardStep::AssetSelection,
        WizardStep::AssetDetails,
        WizardStep::Review,
        WizardStep::Success,
    ];

    /// Zero-based position in the progress indicator.
    pub fn index(self) -> usize {
        Self::ORDERED.iter().position(|step| *step == self).unwrap_or_default()
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::Employee => "Employee",
            Self::Job => "Job Details",
            Self::AssetSelection => "Assets",
            Self::AssetDetails => "Asset Details",
            Self::Review => "Review",
            Self::Success => "Submitted",
        }
    }

    pub fn next(self) -> Option<Self> {
        Self::ORDERED.get(self.index() + 1).copied()
    }

    pub fn previous(self) -> Option<Self> {
        self.index().checked_sub(1).and_then(|index| Self::ORDERED.get(index).copied())
    }
}

impl fmt::Display for WizardStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "step", rename_all = "snake_case")]
pub enum WizardEvent {
    Advance,
    Back,
    Revisit(WizardStep),
    Submitted,
    Reset,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FlowContext {
    pub missing_required_fields: Vec<String>,
}

impl FlowContext {
    pub fn missing(fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self { missing_required_fields: fields.into_iter().map(Into::into).collect() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowAction {
    MergeEmployee,
    MergeJob,
    SyncAssetBlocks,
    MergeAssetDetails,
    PersistSubmission,
    ClearDraft,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: WizardStep,
    pub to: WizardStep,
    pub event: WizardEvent,
    pub actions: Vec<FlowAction>,
}
