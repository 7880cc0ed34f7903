use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::sync::{Mutex, OnceLock};

use assetmap_cli::commands::{config, create_admin, export, migrate, stats};
use assetmap_core::domain::asset::{AssetBlock, ComputerBlock, ImageRef};
use assetmap_core::domain::submission::SubmissionRecord;
use assetmap_core::storage::{SubmissionQuery, SubmissionStore};
use assetmap_db::{connect, migrations, SqlSubmissionStore};
use serde_json::Value;
use tempfile::TempDir;

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(&[("ASSETMAP_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_for_non_sqlite_url() {
    with_env(&[("ASSETMAP_DATABASE_URL", "postgres://localhost/assets")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn create_admin_creates_once_and_reports_conflict() {
    let dir = TempDir::new().expect("tempdir");
    let url = database_url(&dir);

    with_env(&[("ASSETMAP_DATABASE_URL", url.as_str())], || {
        let first = create_admin::run(
            Some("it-admin@company.com".to_string()),
            Some("secret1".to_string()),
        );
        assert_eq!(first.exit_code, 0, "expected admin account creation: {}", first.output);
        assert_eq!(parse_payload(&first.output)["command"], "create-admin");

        let second = create_admin::run(
            Some("IT-Admin@company.com".to_string()),
            Some("secret1".to_string()),
        );
        assert_eq!(second.exit_code, 7, "expected duplicate account conflict");
        assert_eq!(parse_payload(&second.output)["error_class"], "conflict");
    });
}

#[test]
fn create_admin_rejects_invalid_input_and_uses_bootstrap_config() {
    let dir = TempDir::new().expect("tempdir");
    let url = database_url(&dir);

    with_env(&[("ASSETMAP_DATABASE_URL", url.as_str())], || {
        let invalid = create_admin::run(Some("not-an-email".to_string()), Some("123".to_string()));
        assert_eq!(invalid.exit_code, 6);
        let payload = parse_payload(&invalid.output);
        assert_eq!(payload["error_class"], "invalid_input");
        assert!(payload["message"].as_str().unwrap_or_default().contains("at least 6"));

        let missing = create_admin::run(None, None);
        assert_eq!(missing.exit_code, 6);
    });

    with_env(
        &[
            ("ASSETMAP_DATABASE_URL", url.as_str()),
            ("ASSETMAP_ADMIN_BOOTSTRAP_EMAIL", "ops@company.com"),
            ("ASSETMAP_ADMIN_BOOTSTRAP_PASSWORD", "bootstrap-secret"),
        ],
        || {
            let result = create_admin::run(None, None);
            assert_eq!(result.exit_code, 0, "expected bootstrap account: {}", result.output);
            let message = parse_payload(&result.output)["message"].clone();
            assert_eq!(message, "created admin account ops@company.com");
        },
    );
}

#[test]
fn export_writes_csv_for_filtered_submissions() {
    let dir = TempDir::new().expect("tempdir");
    let url = database_url(&dir);
    seed_submissions(&url);
    let output = dir.path().join("out.csv");

    with_env(&[("ASSETMAP_DATABASE_URL", url.as_str())], || {
        let result = export::run(export::ExportArgs {
            output: Some(output.clone()),
            query: SubmissionQuery { company: Some("AUTOZONE".to_string()), ..Default::default() },
        });
        assert_eq!(result.exit_code, 0, "expected export success: {}", result.output);

        let payload = parse_payload(&result.output);
        assert!(payload["message"].as_str().unwrap_or_default().starts_with("exported 1 submissions"));
    });

    let csv = fs::read_to_string(&output).expect("read export");
    let lines = csv.lines().collect::<Vec<_>>();
    assert_eq!(lines.len(), 2, "header plus one row");
    assert!(lines[0].starts_with("Employee Name,Contact,Employee ID"));
    assert!(lines[1].starts_with("Jane Roe,9123456789,EMP-100,AUTOZONE"));
    assert!(lines[1].contains("SN123"));
}

#[test]
fn stats_reports_totals_as_structured_data() {
    let dir = TempDir::new().expect("tempdir");
    let url = database_url(&dir);
    seed_submissions(&url);

    with_env(&[("ASSETMAP_DATABASE_URL", url.as_str())], || {
        let result = stats::run(SubmissionQuery::default());
        assert_eq!(result.exit_code, 0, "expected stats success: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["data"]["total"], 2);
        assert_eq!(payload["data"]["totalImages"], 2);
        assert_eq!(payload["data"]["byCompany"]["AUTOZONE"], 1);
        assert_eq!(payload["data"]["byAsset"]["Laptop"], 2);
    });
}

#[test]
fn config_reports_sources_and_redacts_secrets() {
    with_env(
        &[
            ("ASSETMAP_SERVER_PORT", "9191"),
            ("ASSETMAP_LOG_LEVEL", "debug"),
            ("ASSETMAP_ADMIN_BOOTSTRAP_EMAIL", "ops@company.com"),
            ("ASSETMAP_ADMIN_BOOTSTRAP_PASSWORD", "bootstrap-secret"),
        ],
        || {
            let output = config::run();

            assert!(output.contains("- server.port = 9191 (source: env (ASSETMAP_SERVER_PORT))"));
            assert!(output.contains("- logging.level = debug (source: env (ASSETMAP_LOG_LEVEL))"));
            assert!(output.contains("- storage.bucket = asset-images (source: default)"));
            assert!(output.contains("- admin.bootstrap_password = <redacted>"));
            assert!(!output.contains("bootstrap-secret"));
        },
    );
}

fn database_url(dir: &TempDir) -> String {
    format!("sqlite://{}", dir.path().join("assetmap.db").display())
}

fn laptop_record(name: &str, company: &str, serial: &str) -> SubmissionRecord {
    SubmissionRecord {
        employee_name: name.to_string(),
        employee_id: "EMP-100".to_string(),
        employee_number: Some("9123456789".to_string()),
        employee_email: None,
        company: company.to_string(),
        department: "IT".to_string(),
        designation: "Engineer".to_string(),
        selected_assets: vec!["Laptop".to_string()],
        asset_details: BTreeMap::from([(
            "laptop".to_string(),
            AssetBlock::Computer(ComputerBlock {
                brand: "Dell".to_string(),
                serial_number: serial.to_string(),
                accessories: ["Mouse".to_string()].into_iter().collect(),
                images: vec![ImageRef(format!("http://127.0.0.1:8080/files/{serial}.png"))],
            }),
        )]),
        confirmed: true,
    }
}

fn seed_submissions(url: &str) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime");
    runtime.block_on(async {
        let pool = connect(url).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let store = SqlSubmissionStore::new(pool.clone());
        store.insert(laptop_record("Jane Roe", "AUTOZONE", "SN123")).await.expect("insert");
        store.insert(laptop_record("John Doe", "VERAVITA", "SN456")).await.expect("insert");
        pool.close().await;
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "ASSETMAP_DATABASE_URL",
        "ASSETMAP_DATABASE_MAX_CONNECTIONS",
        "ASSETMAP_DATABASE_TIMEOUT_SECS",
        "ASSETMAP_STORAGE_ROOT",
        "ASSETMAP_STORAGE_BUCKET",
        "ASSETMAP_STORAGE_PUBLIC_BASE_URL",
        "ASSETMAP_INTAKE_CONTACT",
        "ASSETMAP_INTAKE_CATALOG_PATH",
        "ASSETMAP_SERVER_PORT",
        "ASSETMAP_ADMIN_SESSION_TTL_SECS",
        "ASSETMAP_ADMIN_BOOTSTRAP_EMAIL",
        "ASSETMAP_ADMIN_BOOTSTRAP_PASSWORD",
        "ASSETMAP_LOGGING_LEVEL",
        "ASSETMAP_LOGGING_FORMAT",
        "ASSETMAP_LOG_LEVEL",
        "ASSETMAP_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
