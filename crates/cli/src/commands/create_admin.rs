use secrecy::ExposeSecret;

use assetmap_core::admin::{validate_credentials, AdminError};
use assetmap_core::storage::{Credentials, IdentityStore, StoreError};
use assetmap_db::SqlIdentityStore;

use crate::commands::{load_config, open_pool, runtime, CommandResult, StepFailure};

/// Missing values fall back to `admin.bootstrap_email` / `admin.bootstrap_password`.
pub fn run(email: Option<String>, password: Option<String>) -> CommandResult {
    let config = match load_config("create-admin") {
        Ok(config) => config,
        Err(result) => return result,
    };

    let email = email.or_else(|| config.admin.bootstrap_email.clone());
    let password = password.or_else(|| {
        config.admin.bootstrap_password.as_ref().map(|secret| secret.expose_secret().to_string())
    });
    let (Some(email), Some(password)) = (email, password) else {
        return CommandResult::failure(
            "create-admin",
            "invalid_input",
            "provide --email and --password or configure admin.bootstrap_email/password",
            6,
        );
    };

    let credentials = Credentials::new(email, password);
    if let Err(AdminError::InvalidInput(errors)) = validate_credentials(&credentials) {
        let message = errors.values().cloned().collect::<Vec<_>>().join("; ");
        return CommandResult::failure("create-admin", "invalid_input", message, 6);
    }

    let runtime = match runtime("create-admin") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };
    let ttl = config.session_ttl();

    let result = runtime.block_on(async {
        let pool = open_pool(&config).await?;
        let identity = SqlIdentityStore::new(pool.clone(), ttl);
        let created = identity.sign_up(&credentials).await.map_err(|error| match error {
            StoreError::Conflict(message) => ("conflict", message, 7u8),
            other => ("store", other.to_string(), 6u8),
        })?;
        pool.close().await;
        Ok::<_, StepFailure>(created)
    });

    match result {
        Ok(user) => {
            CommandResult::success("create-admin", format!("created admin account {}", user.email))
        }
        Err(failure) => CommandResult::from_step("create-admin", failure),
    }
}
