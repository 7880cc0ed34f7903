use std::sync::Arc;

use assetmap_core::assembler::{BlockField, BlockValidation};
use assetmap_core::audit::InMemoryAuditSink;
use assetmap_core::catalog::{AssetCatalog, AssetKey};
use assetmap_core::domain::asset::AssetBlock;
use assetmap_core::domain::employee::{EmployeeInput, JobInput};
use assetmap_core::export::export_csv;
use assetmap_core::finalize::SubmissionFinalizer;
use assetmap_core::schema::{FieldSchemas, SchemaOptions};
use assetmap_core::storage::{SubmissionQuery, SubmissionStore};
use assetmap_core::upload::{ImageUploader, UploadFile, UploadLimits};
use assetmap_core::wizard::{StepInput, Wizard};
use assetmap_db::{connect, migrations, FilesystemObjectStore, SqlSubmissionStore};
use tempfile::TempDir;

type ContractResult<T = ()> = Result<T, String>;

macro_rules! require {
    ($cond:expr) => {
        if !$cond {
            return Err(format!("assertion failed: `{}`", stringify!($cond)));
        }
    };
    ($cond:expr, $($arg:tt)*) => {
        if !$cond {
            return Err(format!($($arg)*));
        }
    };
}

macro_rules! require_eq {
    ($left:expr, $right:expr) => {
        if $left != $right {
            return Err(format!(
                "assertion failed: `left == right` (`{:?}` != `{:?}`)",
                $left,
                $right
            ));
        }
    };
}

fn step<T>(result: Result<T, impl std::fmt::Display>, label: &str) -> ContractResult<T> {
    result.map_err(|error| format!("{label} failed: {error}"))
}

#[tokio::test]
async fn submitted_wizard_survives_reconnect_with_its_images() -> ContractResult {
    let dir = step(TempDir::new(), "tempdir")?;
    let url = format!("sqlite://{}", dir.path().join("assetmap.db").display());
    let objects = FilesystemObjectStore::new(dir.path().join("uploads"), "asset-images", "http://host/files");

    let pool = step(connect(&url).await, "connect")?;
    step(migrations::run_pending(&pool).await, "migrations")?;

    let catalog = Arc::new(AssetCatalog::default());
    let schemas =
        Arc::new(FieldSchemas::new(SchemaOptions::default(), catalog.directory().clone()));
    let finalizer =
        SubmissionFinalizer::new(Arc::new(SqlSubmissionStore::new(pool.clone())), Arc::clone(&catalog));
    let uploader = ImageUploader::new(Arc::new(objects.clone()), UploadLimits::default());
    let mut wizard = Wizard::new(
        "contract",
        Arc::clone(&catalog),
        schemas,
        BlockValidation::CollectAll,
        Arc::new(InMemoryAuditSink::default()),
    );

    step(
        wizard.advance(
            StepInput::Employee(EmployeeInput {
                full_name: "Jane Roe".to_string(),
                contact: "9123456789".to_string(),
                employee_id: "EMP-100".to_string(),
            }),
            "contract",
        ),
        "employee step",
    )?;
    step(
        wizard.advance(
            StepInput::Job(JobInput {
                company: "VERAVITA".to_string(),
                department: "IT".to_string(),
                designation: "Engineer".to_string(),
            }),
            "contract",
        ),
        "job step",
    )?;
    step(wizard.advance(StepInput::AssetSelection(vec!["laptop".to_string()]), "contract"), "selection")?;

    let laptop = AssetKey::new("laptop");
    step(wizard.set_block_field(&laptop, BlockField::Brand, "Lenovo"), "brand")?;
    step(wizard.set_block_field(&laptop, BlockField::SerialNumber, "PF-42"), "serial")?;
    let ticket = step(wizard.begin_upload(&laptop, 1), "begin upload")?;
    let report = uploader
        .upload_batch(vec![UploadFile {
            file_name: "front.png".to_string(),
            content_type: "image/png".to_string(),
            bytes: vec![137, 80, 78, 71],
        }])
        .await;
    require!(report.failures.is_empty(), "upload failures: {:?}", report.failures);
    wizard.complete_upload(ticket, report.image_refs(), "contract");

    step(wizard.advance(StepInput::AssetDetails, "contract"), "details step")?;
    step(wizard.set_confirmed(true), "confirm")?;
    let id = step(wizard.submit(&finalizer, "contract").await, "submit")?;
    pool.close().await;

    let reopened = step(connect(&url).await, "reconnect")?;
    let store = SqlSubmissionStore::new(reopened.clone());
    let stored = step(store.get(&id).await, "get")?.ok_or("submission missing after reconnect")?;
    require_eq!(stored.record.company.as_str(), "VERAVITA");
    require_eq!(stored.record.selected_assets, vec!["Laptop".to_string()]);

    let Some(AssetBlock::Computer(block)) = stored.record.asset_details.get("laptop") else {
        return Err("laptop block should be a computer block".to_string());
    };
    require_eq!(block.serial_number.as_str(), "PF-42");
    require_eq!(block.images.len(), 1);
    let object_name = block.images[0]
        .as_str()
        .rsplit('/')
        .next()
        .ok_or("image url should name an object")?
        .to_string();
    require!(objects.dir().join(&object_name).is_file(), "object `{object_name}` missing on disk");

    let listed = step(store.list(&SubmissionQuery::default()).await, "list")?;
    let csv = step(export_csv(&catalog, &listed), "export")?;
    require!(csv.contains("Jane Roe"), "csv should contain the employee row");
    require!(csv.contains("PF-42"), "csv should contain the laptop serial");

    reopened.close().await;
    Ok(())
}
