use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::assembler::BlockValidation;
use crate::catalog::{AssetCatalog, CatalogError};
use crate::schema::{is_email, ContactField, SchemaOptions};
use crate::upload::{UploadLimits, DEFAULT_MAX_FILE_BYTES, DEFAULT_TIMEOUT_SECS};

const MAX_UPLOAD_BYTES_CEILING: u64 = 50 * 1024 * 1024;
const MAX_SESSION_TTL_SECS: u64 = 30 * 24 * 60 * 60;
const MAX_IDLE_TIMEOUT_SECS: u64 = 7 * 24 * 60 * 60;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub intake: IntakeConfig,
    pub upload: UploadConfig,
    pub server: ServerConfig,
    pub admin: AdminConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub root: PathBuf,
    pub bucket: String,
    pub public_base_url: String,
}

#[derive(Clone, Debug)]
pub struct IntakeConfig {
    pub contact: ContactField,
    pub name_letters_only: bool,
    pub require_images: bool,
    pub block_validation: BlockValidation,
    pub catalog_path: Option<PathBuf>,
    /// Open wizards untouched for this long are dropped.
    pub idle_timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct UploadConfig {
    pub timeout_secs: u64,
    pub max_file_bytes: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct AdminConfig {
    pub session_ttl_secs: u64,
    pub bootstrap_email: Option<String>,
    pub bootstrap_password: Option<SecretString>,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub storage_root: Option<PathBuf>,
    pub server_port: Option<u16>,
    pub contact: Option<ContactField>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://assetmap.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            storage: StorageConfig {
                root: PathBuf::from("data/uploads"),
                bucket: "asset-images".to_string(),
                public_base_url: "http://127.0.0.1:8080/files".to_string(),
            },
            intake: IntakeConfig {
                contact: ContactField::Phone,
                name_letters_only: true,
                require_images: true,
                block_validation: BlockValidation::CollectAll,
                catalog_path: None,
                idle_timeout_secs: 3600,
            },
            upload: UploadConfig {
                timeout_secs: DEFAULT_TIMEOUT_SECS,
                max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            admin: AdminConfig {
                session_ttl_secs: 8 * 60 * 60,
                bootstrap_email: None,
                bootstrap_password: None,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("assetmap.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    pub fn schema_options(&self) -> SchemaOptions {
        SchemaOptions {
            contact: self.intake.contact,
            name_letters_only: self.intake.name_letters_only,
            require_images: self.intake.require_images,
        }
    }

    pub fn upload_limits(&self) -> UploadLimits {
        UploadLimits {
            max_file_bytes: self.upload.max_file_bytes,
            timeout: Duration::from_secs(self.upload.timeout_secs),
        }
    }

    /// The configured catalog file, or the built-in catalog when none is set.
    pub fn load_catalog(&self) -> Result<AssetCatalog, ConfigError> {
        match &self.intake.catalog_path {
            Some(path) => Ok(AssetCatalog::load(path)?),
            None => Ok(AssetCatalog::default()),
        }
    }

    pub fn wizard_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.intake.idle_timeout_secs)
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.admin.session_ttl_secs.min(MAX_SESSION_TTL_SECS) as i64)
    }

    /// Directory that holds uploaded objects.
    pub fn bucket_dir(&self) -> PathBuf {
        self.storage.root.join(&self.storage.bucket)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(storage) = patch.storage {
            if let Some(root) = storage.root {
                self.storage.root = root;
            }
            if let Some(bucket) = storage.bucket {
                self.storage.bucket = bucket;
            }
            if let Some(public_base_url) = storage.public_base_url {
                self.storage.public_base_url = public_base_url;
            }
        }

        if let Some(intake) = patch.intake {
            if let Some(contact) = intake.contact {
                self.intake.contact = contact;
            }
            if let Some(name_letters_only) = intake.name_letters_only {
                self.intake.name_letters_only = name_letters_only;
            }
            if let Some(require_images) = intake.require_images {
                self.intake.require_images = require_images;
            }
            if let Some(block_validation) = intake.block_validation {
                self.intake.block_validation = block_validation;
            }
            if let Some(catalog_path) = intake.catalog_path {
                self.intake.catalog_path = Some(catalog_path);
            }
            if let Some(idle_timeout_secs) = intake.idle_timeout_secs {
                self.intake.idle_timeout_secs = idle_timeout_secs;
            }
        }

        if let Some(upload) = patch.upload {
            if let Some(timeout_secs) = upload.timeout_secs {
                self.upload.timeout_secs = timeout_secs;
            }
            if let Some(max_file_bytes) = upload.max_file_bytes {
                self.upload.max_file_bytes = max_file_bytes;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(admin) = patch.admin {
            if let Some(session_ttl_secs) = admin.session_ttl_secs {
                self.admin.session_ttl_secs = session_ttl_secs;
            }
            if let Some(bootstrap_email) = admin.bootstrap_email {
                self.admin.bootstrap_email = Some(bootstrap_email);
            }
            if let Some(bootstrap_password) = admin.bootstrap_password {
                self.admin.bootstrap_password = Some(secret_value(bootstrap_password));
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("ASSETMAP_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("ASSETMAP_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("ASSETMAP_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("ASSETMAP_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("ASSETMAP_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("ASSETMAP_STORAGE_ROOT") {
            self.storage.root = PathBuf::from(value);
        }
        if let Some(value) = read_env("ASSETMAP_STORAGE_BUCKET") {
            self.storage.bucket = value;
        }
        if let Some(value) = read_env("ASSETMAP_STORAGE_PUBLIC_BASE_URL") {
            self.storage.public_base_url = value;
        }

        if let Some(value) = read_env("ASSETMAP_INTAKE_CONTACT") {
            self.intake.contact = value.parse().map_err(ConfigError::Validation)?;
        }
        if let Some(value) = read_env("ASSETMAP_INTAKE_NAME_LETTERS_ONLY") {
            self.intake.name_letters_only =
                parse_bool("ASSETMAP_INTAKE_NAME_LETTERS_ONLY", &value)?;
        }
        if let Some(value) = read_env("ASSETMAP_INTAKE_REQUIRE_IMAGES") {
            self.intake.require_images = parse_bool("ASSETMAP_INTAKE_REQUIRE_IMAGES", &value)?;
        }
        if let Some(value) = read_env("ASSETMAP_INTAKE_BLOCK_VALIDATION") {
            self.intake.block_validation = value.parse().map_err(ConfigError::Validation)?;
        }
        if let Some(value) = read_env("ASSETMAP_INTAKE_CATALOG_PATH") {
            self.intake.catalog_path = Some(PathBuf::from(value));
        }
        if let Some(value) = read_env("ASSETMAP_INTAKE_IDLE_TIMEOUT_SECS") {
            self.intake.idle_timeout_secs =
                parse_u64("ASSETMAP_INTAKE_IDLE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("ASSETMAP_UPLOAD_TIMEOUT_SECS") {
            self.upload.timeout_secs = parse_u64("ASSETMAP_UPLOAD_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("ASSETMAP_UPLOAD_MAX_FILE_BYTES") {
            self.upload.max_file_bytes = parse_u64("ASSETMAP_UPLOAD_MAX_FILE_BYTES", &value)?;
        }

        if let Some(value) = read_env("ASSETMAP_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("ASSETMAP_SERVER_PORT") {
            self.server.port = parse_u16("ASSETMAP_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("ASSETMAP_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("ASSETMAP_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("ASSETMAP_ADMIN_SESSION_TTL_SECS") {
            self.admin.session_ttl_secs = parse_u64("ASSETMAP_ADMIN_SESSION_TTL_SECS", &value)?;
        }
        if let Some(value) = read_env("ASSETMAP_ADMIN_BOOTSTRAP_EMAIL") {
            self.admin.bootstrap_email = Some(value);
        }
        if let Some(value) = read_env("ASSETMAP_ADMIN_BOOTSTRAP_PASSWORD") {
            self.admin.bootstrap_password = Some(secret_value(value));
        }

        let log_level =
            read_env("ASSETMAP_LOGGING_LEVEL").or_else(|| read_env("ASSETMAP_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("ASSETMAP_LOGGING_FORMAT").or_else(|| read_env("ASSETMAP_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(storage_root) = overrides.storage_root {
            self.storage.root = storage_root;
        }
        if let Some(server_port) = overrides.server_port {
            self.server.port = server_port;
        }
        if let Some(contact) = overrides.contact {
            self.intake.contact = contact;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_storage(&self.storage)?;
        validate_intake(&self.intake)?;
        validate_upload(&self.upload)?;
        validate_server(&self.server)?;
        validate_admin(&self.admin)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("assetmap.toml"), PathBuf::from("config/assetmap.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_storage(storage: &StorageConfig) -> Result<(), ConfigError> {
    if storage.root.as_os_str().is_empty() {
        return Err(ConfigError::Validation("storage.root must not be empty".to_string()));
    }

    let bucket_ok = !storage.bucket.is_empty()
        && storage.bucket.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if !bucket_ok {
        return Err(ConfigError::Validation(
            "storage.bucket must be non-empty and use only a-z, 0-9 and `-`".to_string(),
        ));
    }

    let base_url = storage.public_base_url.trim();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "storage.public_base_url must start with http:// or https://".to_string(),
        ));
    }

    Ok(())
}

fn validate_intake(intake: &IntakeConfig) -> Result<(), ConfigError> {
    if intake.idle_timeout_secs < 60 || intake.idle_timeout_secs > MAX_IDLE_TIMEOUT_SECS {
        return Err(ConfigError::Validation(format!(
            "intake.idle_timeout_secs must be in range 60..={MAX_IDLE_TIMEOUT_SECS}"
        )));
    }

    Ok(())
}

fn validate_upload(upload: &UploadConfig) -> Result<(), ConfigError> {
    if upload.timeout_secs == 0 || upload.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "upload.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if upload.max_file_bytes == 0 || upload.max_file_bytes > MAX_UPLOAD_BYTES_CEILING {
        return Err(ConfigError::Validation(format!(
            "upload.max_file_bytes must be in range 1..={MAX_UPLOAD_BYTES_CEILING}"
        )));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_admin(admin: &AdminConfig) -> Result<(), ConfigError> {
    if admin.session_ttl_secs == 0 || admin.session_ttl_secs > MAX_SESSION_TTL_SECS {
        return Err(ConfigError::Validation(format!(
            "admin.session_ttl_secs must be in range 1..={MAX_SESSION_TTL_SECS}"
        )));
    }

    match (&admin.bootstrap_email, &admin.bootstrap_password) {
        (None, None) => Ok(()),
        (Some(email), Some(password)) => {
            if !is_email(email.trim()) {
                return Err(ConfigError::Validation(
                    "admin.bootstrap_email must be a valid email address".to_string(),
                ));
            }
            if password.expose_secret().chars().count() < 6 {
                return Err(ConfigError::Validation(
                    "admin.bootstrap_password must be at least 6 characters".to_string(),
                ));
            }
            Ok(())
        }
        _ => Err(ConfigError::Validation(
            "admin.bootstrap_email and admin.bootstrap_password must be set together".to_string(),
        )),
    }
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    storage: Option<StoragePatch>,
    intake: Option<IntakePatch>,
    upload: Option<UploadPatch>,
    server: Option<ServerPatch>,
    admin: Option<AdminPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct StoragePatch {
    root: Option<PathBuf>,
    bucket: Option<String>,
    public_base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct IntakePatch {
    contact: Option<ContactField>,
    name_letters_only: Option<bool>,
    require_images: Option<bool>,
    block_validation: Option<BlockValidation>,
    catalog_path: Option<PathBuf>,
    idle_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct UploadPatch {
    timeout_secs: Option<u64>,
    max_file_bytes: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct AdminPatch {
    session_ttl_secs: Option<u64>,
    bootstrap_email: Option<String>,
    bootstrap_password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::path::PathBuf;
    use std::sync::{Mutex, OnceLock};
    use std::time::Duration;

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use crate::assembler::BlockValidation;
    use crate::schema::ContactField;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_are_valid_without_a_file() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions {
            config_path: Some(PathBuf::from("does-not-exist.toml")),
            ..LoadOptions::default()
        })
        .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.intake.contact == ContactField::Phone, "phone contact is the default")?;
        ensure(config.intake.require_images, "images are required by default")?;
        ensure(
            config.intake.block_validation == BlockValidation::CollectAll,
            "collect-all validation is the default",
        )?;
        ensure(config.upload.max_file_bytes == 5 * 1024 * 1024, "default upload limit is 5 MiB")?;
        ensure(config.bucket_dir().ends_with("asset-images"), "bucket dir should end in bucket")?;
        ensure(
            matches!(config.logging.format, LogFormat::Compact),
            "default logging format should be compact",
        )?;
        Ok(())
    }

    #[test]
    fn missing_required_file_is_reported() -> Result<(), String> {
        let result = AppConfig::load(LoadOptions {
            config_path: Some(PathBuf::from("nowhere/assetmap.toml")),
            require_file: true,
            ..LoadOptions::default()
        });

        ensure(
            matches!(result, Err(ConfigError::MissingConfigFile(_))),
            "a required but absent file should fail",
        )
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_ASSETMAP_ADMIN_PASSWORD", "from-env-secret");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("assetmap.toml");
            fs::write(
                &path,
                r#"
[admin]
bootstrap_email = "it-admin@company.com"
bootstrap_password = "${TEST_ASSETMAP_ADMIN_PASSWORD}"

[intake]
contact = "email"
block_validation = "fail_fast"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config
                    .admin
                    .bootstrap_password
                    .as_ref()
                    .is_some_and(|password| password.expose_secret() == "from-env-secret"),
                "bootstrap password should be loaded from environment",
            )?;
            ensure(config.intake.contact == ContactField::Email, "contact should come from file")?;
            ensure(
                config.intake.block_validation == BlockValidation::FailFast,
                "block validation should come from file",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_ASSETMAP_ADMIN_PASSWORD"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("ASSETMAP_LOG_LEVEL", "warn");
        env::set_var("ASSETMAP_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["ASSETMAP_LOG_LEVEL", "ASSETMAP_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("ASSETMAP_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("ASSETMAP_SERVER_PORT", "9090");
        env::set_var("ASSETMAP_INTAKE_REQUIRE_IMAGES", "false");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("assetmap.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[server]
port = 7070

[intake]
require_images = true

[storage]
bucket = "field-photos"

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(config.server.port == 9090, "env port should win over file")?;
            ensure(!config.intake.require_images, "env image rule should win over file")?;
            ensure(config.storage.bucket == "field-photos", "file bucket should win over default")?;
            Ok(())
        })();

        clear_vars(&[
            "ASSETMAP_DATABASE_URL",
            "ASSETMAP_SERVER_PORT",
            "ASSETMAP_INTAKE_REQUIRE_IMAGES",
        ]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("ASSETMAP_ADMIN_BOOTSTRAP_EMAIL", "it-admin@company.com");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("admin.bootstrap_password")
            );
            ensure(has_message, "validation failure should mention admin.bootstrap_password")
        })();

        clear_vars(&["ASSETMAP_ADMIN_BOOTSTRAP_EMAIL"]);
        result
    }

    #[test]
    fn invalid_env_values_are_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("ASSETMAP_UPLOAD_MAX_FILE_BYTES", "five-megabytes");

        let result = AppConfig::load(LoadOptions::default());
        clear_vars(&["ASSETMAP_UPLOAD_MAX_FILE_BYTES"]);

        ensure(
            matches!(
                result,
                Err(ConfigError::InvalidEnvOverride { ref key, .. })
                    if key == "ASSETMAP_UPLOAD_MAX_FILE_BYTES"
            ),
            "non-numeric upload limit should be rejected",
        )
    }

    #[test]
    fn wizard_idle_timeout_is_bounded() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("ASSETMAP_INTAKE_IDLE_TIMEOUT_SECS", "5");
        let too_short = AppConfig::load(LoadOptions::default());
        env::set_var("ASSETMAP_INTAKE_IDLE_TIMEOUT_SECS", "900");
        let accepted = AppConfig::load(LoadOptions::default());
        clear_vars(&["ASSETMAP_INTAKE_IDLE_TIMEOUT_SECS"]);

        ensure(
            matches!(
                too_short,
                Err(ConfigError::Validation(ref message)) if message.contains("intake.idle_timeout_secs")
            ),
            "an idle timeout under a minute should be rejected",
        )?;
        let config = accepted.map_err(|err| format!("config load failed: {err}"))?;
        ensure(
            config.wizard_idle_timeout() == Duration::from_secs(900),
            "env idle timeout should be applied",
        )
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("ASSETMAP_ADMIN_BOOTSTRAP_EMAIL", "it-admin@company.com");
        env::set_var("ASSETMAP_ADMIN_BOOTSTRAP_PASSWORD", "hunter2-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(
                !debug.contains("hunter2-secret-value"),
                "debug output should not contain the bootstrap password",
            )
        })();

        clear_vars(&["ASSETMAP_ADMIN_BOOTSTRAP_EMAIL", "ASSETMAP_ADMIN_BOOTSTRAP_PASSWORD"]);
        result
    }
}
