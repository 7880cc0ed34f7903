//! The wizard instance: owns the draft, the active step and the details sub-forms.
//!
//! Every step change goes through [`FlowEngine`], so the transition table is the
//! single source of truth for what can happen from where. Field validation decides
//! what the engine is told is missing.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::assembler::{
    AssemblerError, AssetDetailAssembler, BlockField, BlockState, BlockValidation,
    UploadCompletion, UploadTicket,
};
use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::catalog::{AssetCatalog, AssetKey};
use crate::domain::asset::{AssetBlock, ImageRef};
use crate::domain::employee::{Employee, EmployeeInput, Job, JobInput};
use crate::domain::submission::{SubmissionDraft, SubmissionId};
use crate::finalize::{FinalizeError, SubmissionFinalizer};
use crate::flows::{
    FlowAction, FlowContext, FlowEngine, FlowTransitionError, IntakeFlow, TransitionOutcome,
    WizardEvent, WizardStep,
};
use crate::schema::{FieldErrors, FieldSchemas};

pub const SELECTION_REQUIRED: &str = "Select at least one asset";

/// Values submitted with "Next"; the variant must match the active step.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", content = "data", rename_all = "snake_case")]
pub enum StepInput {
    Employee(EmployeeInput),
    Job(JobInput),
    /// Catalog keys or display labels, in the order they were picked.
    AssetSelection(Vec<String>),
    /// Validates the sub-forms already held by the assembler.
    AssetDetails,
}

impl StepInput {
    pub fn step(&self) -> WizardStep {
        match self {
            Self::Employee(_) => WizardStep::Employee,
            Self::Job(_) => WizardStep::Job,
            Self::AssetSelection(_) => WizardStep::AssetSelection,
            Self::AssetDetails => WizardStep::AssetDetails,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StepRejection {
    #[error("{step} has invalid fields")]
    InvalidFields { step: WizardStep, errors: FieldErrors },
    #[error("{received} input cannot be used while {active} is active")]
    WrongStep { active: WizardStep, received: WizardStep },
    #[error(transparent)]
    Transition(#[from] FlowTransitionError),
    #[error(transparent)]
    Assembler(#[from] AssemblerError),
    #[error(transparent)]
    Finalize(#[from] FinalizeError),
}

impl StepRejection {
    pub fn field_errors(&self) -> Option<&FieldErrors> {
        match self {
            Self::InvalidFields { errors, .. } => Some(errors),
            _ => None,
        }
    }
}

/// Serializable view of a wizard for rendering.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WizardSnapshot<'a> {
    pub id: &'a str,
    pub step: WizardStep,
    pub step_index: usize,
    pub draft: &'a SubmissionDraft,
    pub employee_form: &'a EmployeeInput,
    pub job_form: &'a JobInput,
    pub selection: Vec<&'a str>,
    pub blocks: &'a [BlockState],
    pub last_submission: Option<&'a SubmissionId>,
}

pub struct Wizard {
    id: String,
    step: WizardStep,
    draft: SubmissionDraft,
    employee_form: EmployeeInput,
    job_form: JobInput,
    selection_form: Vec<AssetKey>,
    assembler: AssetDetailAssembler,
    catalog: Arc<AssetCatalog>,
    schemas: Arc<FieldSchemas>,
    block_validation: BlockValidation,
    engine: FlowEngine<IntakeFlow>,
    audit_sink: Arc<dyn AuditSink>,
    last_submission: Option<SubmissionId>,
}

impl Wizard {
    pub fn new(
        id: impl Into<String>,
        catalog: Arc<AssetCatalog>,
        schemas: Arc<FieldSchemas>,
        block_validation: BlockValidation,
        audit_sink: Arc<dyn AuditSink>,
    ) -> Self {
        let engine = FlowEngine::default();
        Self {
            id: id.into(),
            step: engine.initial_state(),
            draft: SubmissionDraft::default(),
            employee_form: EmployeeInput::default(),
            job_form: JobInput::default(),
            selection_form: Vec::new(),
            assembler: AssetDetailAssembler::default(),
            catalog,
            schemas,
            block_validation,
            engine,
            audit_sink,
            last_submission: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn step(&self) -> WizardStep {
        self.step
    }

    pub fn draft(&self) -> &SubmissionDraft {
        &self.draft
    }

    pub fn assembler(&self) -> &AssetDetailAssembler {
        &self.assembler
    }

    pub fn catalog(&self) -> &AssetCatalog {
        &self.catalog
    }

    pub fn last_submission(&self) -> Option<&SubmissionId> {
        self.last_submission.as_ref()
    }

    pub fn snapshot(&self) -> WizardSnapshot<'_> {
        WizardSnapshot {
            id: &self.id,
            step: self.step,
            step_index: self.step.index(),
            draft: &self.draft,
            employee_form: &self.employee_form,
            job_form: &self.job_form,
            selection: self.selection_form.iter().map(AssetKey::as_str).collect(),
            blocks: self.assembler.blocks(),
            last_submission: self.last_submission.as_ref(),
        }
    }

    /// Validates the active step's input and, if it passes, merges it into the draft
    /// and moves forward. A rejection leaves the active step unchanged.
    pub fn advance(
        &mut self,
        input: StepInput,
        correlation_id: &str,
    ) -> Result<&SubmissionDraft, StepRejection> {
        if input.step() != self.step {
            return Err(StepRejection::WrongStep { active: self.step, received: input.step() });
        }

        let validated = self.validate(input);
        let context = match &validated {
            Ok(_) => FlowContext::default(),
            Err(errors) => FlowContext::missing(errors.keys().cloned()),
        };
        let outcome = self.transition(&WizardEvent::Advance, &context, correlation_id);

        let (merge, outcome) = match (validated, outcome) {
            (Ok(merge), Ok(outcome)) => (merge, outcome),
            (Err(errors), _) => {
                return Err(StepRejection::InvalidFields { step: self.step, errors });
            }
            (Ok(_), Err(error)) => return Err(error.into()),
        };
        self.apply_merge(merge, &outcome);
        self.step = outcome.to;
        Ok(&self.draft)
    }

    pub fn back(&mut self, correlation_id: &str) -> Result<WizardStep, StepRejection> {
        let outcome =
            self.transition(&WizardEvent::Back, &FlowContext::default(), correlation_id)?;
        self.navigate(&outcome);
        Ok(self.step)
    }

    pub fn revisit(
        &mut self,
        target: WizardStep,
        correlation_id: &str,
    ) -> Result<WizardStep, StepRejection> {
        let outcome = self.transition(
            &WizardEvent::Revisit(target),
            &FlowContext::default(),
            correlation_id,
        )?;
        self.navigate(&outcome);
        Ok(self.step)
    }

    /// The review checkbox belongs to the Review screen and is cleared on leaving it.
    fn navigate(&mut self, outcome: &TransitionOutcome) {
        if outcome.from == WizardStep::Review {
            self.draft.set_confirmed(false);
        }
        self.step = outcome.to;
    }

    /// The review checkbox.
    pub fn set_confirmed(&mut self, confirmed: bool) -> Result<(), StepRejection> {
        self.require_step(WizardStep::Review)?;
        self.draft.set_confirmed(confirmed);
        Ok(())
    }

    pub fn set_block_field(
        &mut self,
        key: &AssetKey,
        field: BlockField,
        value: impl Into<String>,
    ) -> Result<(), StepRejection> {
        self.require_step(WizardStep::AssetDetails)?;
        Ok(self.assembler.set_field(key, field, value)?)
    }

    pub fn toggle_accessory(&mut self, key: &AssetKey, accessory: &str) -> Result<bool, StepRejection> {
        self.require_step(WizardStep::AssetDetails)?;
        Ok(self.assembler.toggle_accessory(key, accessory)?)
    }

    pub fn remove_image(&mut self, key: &AssetKey, index: usize) -> Result<ImageRef, StepRejection> {
        self.require_step(WizardStep::AssetDetails)?;
        Ok(self.assembler.remove_image(key, index)?)
    }

    pub fn begin_upload(
        &mut self,
        key: &AssetKey,
        files: usize,
    ) -> Result<UploadTicket, StepRejection> {
        self.require_step(WizardStep::AssetDetails)?;
        Ok(self.assembler.begin_upload(key, files)?)
    }

    /// Lands on the ticket's block even if the user navigated away meanwhile.
    pub fn complete_upload(
        &mut self,
        ticket: UploadTicket,
        uploaded: Vec<ImageRef>,
        correlation_id: &str,
    ) -> UploadCompletion {
        let key = ticket.key.clone();
        let completion = self.assembler.complete_upload(ticket, uploaded);
        let outcome = match completion {
            UploadCompletion::Applied { .. } => AuditOutcome::Success,
            UploadCompletion::Discarded => AuditOutcome::Rejected,
        };
        self.audit_sink.emit(
            AuditEvent::new(
                &self.audit_context(correlation_id),
                "upload.batch_completed",
                AuditCategory::Upload,
                outcome,
            )
            .with_metadata("asset", key.to_string())
            .with_metadata("completion", format!("{completion:?}")),
        );
        completion
    }

    /// Persists the confirmed draft. On failure the draft and step are kept so the
    /// user can retry.
    pub async fn submit(
        &mut self,
        finalizer: &SubmissionFinalizer,
        correlation_id: &str,
    ) -> Result<SubmissionId, StepRejection> {
        let context = if self.draft.confirmed() {
            FlowContext::default()
        } else {
            FlowContext::missing(["confirmed"])
        };
        // The store is only called once the transition is known to be legal.
        if let Err(error) = self.engine.apply(&self.step, &WizardEvent::Submitted, &context) {
            let _ = self.transition(&WizardEvent::Submitted, &context, correlation_id);
            return Err(error.into());
        }

        let audit = self.audit_context(correlation_id);
        let id = match finalizer.finalize(&self.draft).await {
            Ok(id) => id,
            Err(error) => {
                self.audit_sink.emit(
                    AuditEvent::new(
                        &audit,
                        "submission.persist_failed",
                        AuditCategory::Persistence,
                        AuditOutcome::Failed,
                    )
                    .with_metadata("error", error.to_string()),
                );
                return Err(error.into());
            }
        };

        self.audit_sink.emit(
            AuditEvent::new(
                &audit.with_submission(id.clone()),
                "submission.persisted",
                AuditCategory::Persistence,
                AuditOutcome::Success,
            )
            .with_metadata("assets", self.draft.selected().len().to_string()),
        );
        let outcome = self.transition(&WizardEvent::Submitted, &context, correlation_id)?;
        if outcome.actions.contains(&FlowAction::ClearDraft) {
            self.clear();
        }
        self.step = outcome.to;
        self.last_submission = Some(id.clone());
        Ok(id)
    }

    /// Starts a new submission from the success screen.
    pub fn reset(&mut self, correlation_id: &str) -> Result<(), StepRejection> {
        let outcome =
            self.transition(&WizardEvent::Reset, &FlowContext::default(), correlation_id)?;
        if outcome.actions.contains(&FlowAction::ClearDraft) {
            self.clear();
        }
        self.step = outcome.to;
        Ok(())
    }

    fn validate(&mut self, input: StepInput) -> Result<Merge, FieldErrors> {
        match input {
            StepInput::Employee(form) => {
                let result = self.schemas.validate_employee(&form).map(Merge::Employee);
                self.employee_form = form;
                result
            }
            StepInput::Job(form) => {
                let result = self.schemas.validate_job(&form).map(Merge::Job);
                self.job_form = form;
                result
            }
            StepInput::AssetSelection(requested) => self.validate_selection(&requested),
            StepInput::AssetDetails => self
                .assembler
                .validate_all(&self.schemas, self.block_validation)
                .map(Merge::AssetDetails),
        }
    }

    fn validate_selection(&mut self, requested: &[String]) -> Result<Merge, FieldErrors> {
        let mut selection: Vec<AssetKey> = Vec::new();
        let mut unknown = Vec::new();
        for entry in requested {
            match self.catalog.resolve(entry) {
                Some(kind) if !selection.contains(&kind.key) => selection.push(kind.key.clone()),
                Some(_) => {}
                None => unknown.push(entry.trim().to_string()),
            }
        }

        if !unknown.is_empty() {
            return Err(FieldErrors::from([(
                "selectedAssets".to_string(),
                format!("Unknown asset type: {}", unknown.join(", ")),
            )]));
        }
        self.selection_form = selection.clone();
        if selection.is_empty() {
            return Err(FieldErrors::from([(
                "selectedAssets".to_string(),
                SELECTION_REQUIRED.to_string(),
            )]));
        }
        Ok(Merge::Selection(selection))
    }

    fn apply_merge(&mut self, merge: Merge, outcome: &TransitionOutcome) {
        for action in &outcome.actions {
            match (action, &merge) {
                (FlowAction::MergeEmployee, Merge::Employee(employee)) => {
                    self.draft.set_employee(employee.clone());
                }
                (FlowAction::MergeJob, Merge::Job(job)) => self.draft.set_job(job.clone()),
                (FlowAction::SyncAssetBlocks, Merge::Selection(selection)) => {
                    self.draft.set_selection(selection.clone());
                    self.assembler.sync_selection(&self.catalog, selection);
                }
                (FlowAction::MergeAssetDetails, Merge::AssetDetails(details)) => {
                    self.draft.set_asset_details(details.clone());
                }
                _ => {}
            }
        }
    }

    fn transition(
        &self,
        event: &WizardEvent,
        context: &FlowContext,
        correlation_id: &str,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        self.engine.apply_with_audit(
            &self.step,
            event,
            context,
            self.audit_sink.as_ref(),
            &self.audit_context(correlation_id),
        )
    }

    fn audit_context(&self, correlation_id: &str) -> AuditContext {
        AuditContext::new(Some(self.id.clone()), None, correlation_id, "wizard")
    }

    fn require_step(&self, step: WizardStep) -> Result<(), StepRejection> {
        if self.step != step {
            return Err(StepRejection::WrongStep { active: self.step, received: step });
        }
        Ok(())
    }

    fn clear(&mut self) {
        self.draft = SubmissionDraft::default();
        self.employee_form = EmployeeInput::default();
        self.job_form = JobInput::default();
        self.selection_form.clear();
        self.assembler.clear();
    }
}

enum Merge {
    Employee(Employee),
    Job(Job),
    Selection(Vec<AssetKey>),
    AssetDetails(BTreeMap<AssetKey, AssetBlock>),
}
