pub mod admin;
pub mod assembler;
pub mod audit;
pub mod catalog;
pub mod config;
pub mod domain;
pub mod errors;
pub mod export;
pub mod finalize;
pub mod flows;
pub mod schema;
pub mod storage;
pub mod upload;
pub mod wizard;

pub use admin::{AdminConsole, AdminError, SubmissionStats};
pub use assembler::{AssetDetailAssembler, BlockDraft, BlockField, BlockValidation, UploadTicket};
pub use audit::{AuditCategory, AuditContext, AuditEvent, AuditSink, TracingAuditSink};
pub use catalog::{AssetCatalog, AssetKey, AssetKind, DetailShape, OrgDirectory};
pub use domain::asset::{AssetBlock, ImageRef};
pub use domain::employee::{Contact, Employee, EmployeeInput, Job, JobInput};
pub use domain::submission::{
    StoredSubmission, SubmissionDraft, SubmissionId, SubmissionRecord,
};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use finalize::{FinalizeError, SubmissionFinalizer};
pub use flows::{WizardEvent, WizardStep};
pub use schema::{ContactField, FieldErrors, FieldSchemas, SchemaOptions};
pub use storage::{
    Credentials, IdentityStore, ObjectStore, Session, SessionToken, StoreError, SubmissionQuery,
    SubmissionStore,
};
pub use upload::{ImageUploader, UploadFile, UploadLimits, UploadReport};
pub use wizard::{StepInput, StepRejection, Wizard, WizardSnapshot};
