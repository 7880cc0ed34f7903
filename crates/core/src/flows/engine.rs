use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::flows::states::{
    FlowAction, FlowContext, FlowType, TransitionOutcome, WizardEvent, WizardStep,
};

pub trait FlowDefinition {
    fn flow_type(&self) -> FlowType;
    fn initial_state(&self) -> WizardStep;
    fn transition(
        &self,
        current: &WizardStep,
        event: &WizardEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>;
}

#[derive(Clone, Debug, Default)]
pub struct IntakeFlow;

impl FlowDefinition for IntakeFlow {
    fn flow_type(&self) -> FlowType {
        FlowType::AssetIntake
    }

    fn initial_state(&self) -> WizardStep {
        WizardStep::Employee
    }

    fn transition(
        &self,
        current: &WizardStep,
        event: &WizardEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        transition_intake(current, event, context)
    }
}

#[derive(Clone, Debug)]
pub struct FlowEngine<F> {
    flow: F,
}

impl<F> FlowEngine<F>
where
    F: FlowDefinition,
{
    pub fn new(flow: F) -> Self {
        Self { flow }
    }

    pub fn flow_type(&self) -> FlowType {
        self.flow.flow_type()
    }

    pub fn initial_state(&self) -> WizardStep {
        self.flow.initial_state()
    }

    pub fn apply(
        &self,
        current: &WizardStep,
        event: &WizardEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        self.flow.transition(current, event, context)
    }

    pub fn apply_with_audit<S>(
        &self,
        current: &WizardStep,
        event: &WizardEvent,
        context: &FlowContext,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(current, event, context);
        let flow = self.flow_type().as_str();
        match &result {
            Ok(outcome) => {
                sink.emit(
                    AuditEvent::new(
                        audit,
                        "wizard.transition_applied",
                        AuditCategory::Wizard,
                        AuditOutcome::Success,
                    )
                    .with_metadata("flow", flow)
                    .with_metadata("from", format!("{:?}", outcome.from))
                    .with_metadata("to", format!("{:?}", outcome.to))
                    .with_metadata("event", format!("{:?}", outcome.event)),
                );
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::new(
                        audit,
                        "wizard.transition_rejected",
                        AuditCategory::Wizard,
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("flow", flow)
                    .with_metadata("from", format!("{current:?}"))
                    .with_metadata("event", format!("{event:?}"))
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}

impl Default for FlowEngine<IntakeFlow> {
    fn default() -> Self {
        Self::new(IntakeFlow)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("missing required fields before leaving {state:?}: {missing_fields:?}")]
    MissingRequiredFields { state: WizardStep, missing_fields: Vec<String> },
    #[error("invalid transition from {state:?} using event {event:?}")]
    InvalidTransition { state: WizardStep, event: WizardEvent },
}

fn transition_intake(
    current: &WizardStep,
    event: &WizardEvent,
    context: &FlowContext,
) -> Result<TransitionOutcome, FlowTransitionError> {
    use FlowAction::{
        ClearDraft, MergeAssetDetails, MergeEmployee, MergeJob, PersistSubmission, SyncAssetBlocks,
    };
    use WizardEvent::{Advance, Back, Reset, Revisit, Submitted};
    use WizardStep::{AssetDetails, AssetSelection, Employee, Job, Review, Success};

    let invalid =
        || FlowTransitionError::InvalidTransition { state: *current, event: event.clone() };
    let require_fields = || {
        if context.missing_required_fields.is_empty() {
            Ok(())
        } else {
            Err(FlowTransitionError::MissingRequiredFields {
                state: *current,
                missing_fields: context.missing_required_fields.clone(),
            })
        }
    };

    let (to, actions) = match (current, event) {
        (Employee, Advance) => {
            require_fields()?;
            (Job, vec![MergeEmployee])
        }
        (Job, Advance) => {
            require_fields()?;
            (AssetSelection, vec![MergeJob])
        }
        (AssetSelection, Advance) => {
            require_fields()?;
            (AssetDetails, vec![SyncAssetBlocks])
        }
        (AssetDetails, Advance) => {
            require_fields()?;
            (Review, vec![MergeAssetDetails])
        }
        (Review, Submitted) => {
            require_fields()?;
            (Success, vec![PersistSubmission, ClearDraft])
        }
        (Job | AssetSelection | AssetDetails | Review, Back) => {
            (current.previous().ok_or_else(invalid)?, Vec::new())
        }
        (Job | AssetSelection | AssetDetails | Review, Revisit(target)) if target < current => {
            (*target, Vec::new())
        }
        (Success, Reset) => (Employee, vec![ClearDraft]),
        _ => return Err(invalid()),
    };

    Ok(TransitionOutcome { from: *current, to, event: event.clone(), actions })
}
