//! Flat CSV export of persisted submissions, one row per submission.

use chrono::NaiveDate;
use thiserror::Error;

use crate::catalog::{AssetCatalog, AssetKind, DetailShape};
use crate::domain::asset::ImageRef;
use crate::domain::submission::StoredSubmission;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("could not write csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("csv output is not valid utf-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
    #[error("could not flush csv writer: {0}")]
    Flush(String),
}

const LEADING_COLUMNS: [&str; 7] =
    ["Employee Name", "Contact", "Employee ID", "Company", "Department", "Designation", "Assets"];
const TRAILING_COLUMNS: [&str; 2] = ["Images", "Submitted At"];

/// `asset-submissions-<date>.csv`
pub fn export_file_name(date: NaiveDate) -> String {
    format!("asset-submissions-{}.csv", date.format("%Y-%m-%d"))
}

fn structured_kinds(catalog: &AssetCatalog) -> impl Iterator<Item = &AssetKind> {
    catalog.kinds().iter().filter(|kind| kind.shape.is_structured())
}

/// Header row: fixed employee columns, a brand and identifier column per structured
/// catalog entry, then images and submission date.
pub fn header(catalog: &AssetCatalog) -> Vec<String> {
    let mut columns = LEADING_COLUMNS.iter().map(ToString::to_string).collect::<Vec<_>>();
    for kind in structured_kinds(catalog) {
        let identifier = match kind.shape {
            DetailShape::Mobile => "IMEI",
            _ => "Serial",
        };
        columns.push(format!("{} Brand", kind.label));
        columns.push(format!("{} {identifier}", kind.label));
    }
    columns.extend(TRAILING_COLUMNS.iter().map(ToString::to_string));
    columns
}

pub fn row(catalog: &AssetCatalog, submission: &StoredSubmission) -> Vec<String> {
    let record = &submission.record;
    let mut cells = vec![
        record.employee_name.clone(),
        record.contact().to_string(),
        record.employee_id.clone(),
        record.company.clone(),
        record.department.clone(),
        record.designation.clone(),
        record.selected_assets.join(", "),
    ];
    for kind in structured_kinds(catalog) {
        let block = record.asset_details.get(kind.key.as_str());
        cells.push(block.and_then(|block| block.brand()).unwrap_or_default().to_string());
        cells.push(block.and_then(|block| block.identifier()).unwrap_or_default().to_string());
    }
    cells.push(record.images().map(ImageRef::as_str).collect::<Vec<_>>().join(", "));
    cells.push(submission.created_at.format("%Y-%m-%d").to_string());
    cells
}

pub fn export_csv(
    catalog: &AssetCatalog,
    submissions: &[StoredSubmission],
) -> Result<String, ExportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(header(catalog))?;
    for submission in submissions {
        writer.write_record(row(catalog, submission))?;
    }
    let bytes = writer.into_inner().map_err(|error| ExportError::Flush(error.to_string()))?;
    Ok(String::from_utf8(bytes)?)
}
