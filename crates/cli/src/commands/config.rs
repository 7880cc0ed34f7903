use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use assetmap_core::config::{AppConfig, LoadOptions};
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in effective_fields(&config) {
        let source = field_source(
            field.key_path,
            field.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key_path, &field.value, source));
    }

    lines.join("\n")
}

struct Field {
    key_path: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

fn field(key_path: &'static str, value: String, env_keys: &'static [&'static str]) -> Field {
    Field { key_path, value, env_keys }
}

fn effective_fields(config: &AppConfig) -> Vec<Field> {
    let catalog_path = config
        .intake
        .catalog_path
        .as_ref()
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| "<built-in>".to_string());
    let bootstrap_password =
        if config.admin.bootstrap_password.is_some() { "<redacted>" } else { "<unset>" };

    vec![
        field("database.url", config.database.url.clone(), &["ASSETMAP_DATABASE_URL"]),
        field(
            "database.max_connections",
            config.database.max_connections.to_string(),
            &["ASSETMAP_DATABASE_MAX_CONNECTIONS"],
        ),
        field(
            "database.timeout_secs",
            config.database.timeout_secs.to_string(),
            &["ASSETMAP_DATABASE_TIMEOUT_SECS"],
        ),
        field("storage.root", config.storage.root.display().to_string(), &["ASSETMAP_STORAGE_ROOT"]),
        field("storage.bucket", config.storage.bucket.clone(), &["ASSETMAP_STORAGE_BUCKET"]),
        field(
            "storage.public_base_url",
            config.storage.public_base_url.clone(),
            &["ASSETMAP_STORAGE_PUBLIC_BASE_URL"],
        ),
        field("intake.contact", format!("{:?}", config.intake.contact), &["ASSETMAP_INTAKE_CONTACT"]),
        field(
            "intake.name_letters_only",
            config.intake.name_letters_only.to_string(),
            &["ASSETMAP_INTAKE_NAME_LETTERS_ONLY"],
        ),
        field(
            "intake.require_images",
            config.intake.require_images.to_string(),
            &["ASSETMAP_INTAKE_REQUIRE_IMAGES"],
        ),
        field(
            "intake.block_validation",
            format!("{:?}", config.intake.block_validation),
            &["ASSETMAP_INTAKE_BLOCK_VALIDATION"],
        ),
        field("intake.catalog_path", catalog_path, &["ASSETMAP_INTAKE_CATALOG_PATH"]),
        field(
            "upload.timeout_secs",
            config.upload.timeout_secs.to_string(),
            &["ASSETMAP_UPLOAD_TIMEOUT_SECS"],
        ),
        field(
            "upload.max_file_bytes",
            config.upload.max_file_bytes.to_string(),
            &["ASSETMAP_UPLOAD_MAX_FILE_BYTES"],
        ),
        field(
            "server.bind_address",
            config.server.bind_address.clone(),
            &["ASSETMAP_SERVER_BIND_ADDRESS"],
        ),
        field("server.port", config.server.port.to_string(), &["ASSETMAP_SERVER_PORT"]),
        field(
            "server.graceful_shutdown_secs",
            config.server.graceful_shutdown_secs.to_string(),
            &["ASSETMAP_SERVER_GRACEFUL_SHUTDOWN_SECS"],
        ),
        field(
            "admin.session_ttl_secs",
            config.admin.session_ttl_secs.to_string(),
            &["ASSETMAP_ADMIN_SESSION_TTL_SECS"],
        ),
        field(
            "admin.bootstrap_email",
            config.admin.bootstrap_email.clone().unwrap_or_else(|| "<unset>".to_string()),
            &["ASSETMAP_ADMIN_BOOTSTRAP_EMAIL"],
        ),
        field(
            "admin.bootstrap_password",
            bootstrap_password.to_string(),
            &["ASSETMAP_ADMIN_BOOTSTRAP_PASSWORD"],
        ),
        field(
            "logging.level",
            config.logging.level.clone(),
            &["ASSETMAP_LOGGING_LEVEL", "ASSETMAP_LOG_LEVEL"],
        ),
        field(
            "logging.format",
            format!("{:?}", config.logging.format),
            &["ASSETMAP_LOGGING_FORMAT", "ASSETMAP_LOG_FORMAT"],
        ),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("assetmap.toml"), PathBuf::from("config/assetmap.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
