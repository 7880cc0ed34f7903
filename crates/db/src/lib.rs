pub mod connection;
pub mod migrations;
pub mod objects;
pub mod repositories;

pub use connection::{connect, connect_with_config, connect_with_settings, DbPool};
pub use objects::FilesystemObjectStore;
pub use repositories::{RepositoryError, SqlIdentityStore, SqlSubmissionStore};
