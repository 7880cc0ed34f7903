pub mod engine;
pub mod states;

pub use engine::{FlowDefinition, FlowEngine, FlowTransitionError, IntakeFlow};
pub use states::{
    FlowAction, FlowContext, FlowType, TransitionOutcome, WizardEvent, WizardStep,
};
