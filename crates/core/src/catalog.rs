//! Selectable asset types, their accessory lists and detail shapes, plus the closed
//! company/department directory used by the job step.
//!
//! The catalog is configuration: the built-in defaults mirror the intake form that is
//! deployed today, and a deployment can swap them for a TOML file.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AssetKey(pub String);

impl AssetKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which sub-form an asset type uses on the details step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetailShape {
    /// Brand, serial number, accessories and photos.
    Computer,
    /// Brand, IMEI, accessories and photos.
    Mobile,
    /// Brand only.
    Brand,
    /// A 10-digit mobile number.
    Sim,
    /// Free-text description.
    Description,
}

impl DetailShape {
    pub fn is_structured(self) -> bool {
        matches!(self, Self::Computer | Self::Mobile)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetKind {
    pub key: AssetKey,
    pub label: String,
    #[serde(default)]
    pub icon: String,
    pub shape: DetailShape,
    #[serde(default)]
    pub accessories: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgDirectory {
    pub companies: Vec<String>,
    pub departments: Vec<String>,
}

impl OrgDirectory {
    pub fn has_company(&self, company: &str) -> bool {
        self.companies.iter().any(|candidate| candidate == company)
    }

    pub fn has_department(&self, department: &str) -> bool {
        self.departments.iter().any(|candidate| candidate == department)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetCatalog {
    #[serde(rename = "asset")]
    kinds: Vec<AssetKind>,
    directory: OrgDirectory,
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("could not read catalog file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse catalog file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("invalid catalog: {0}")]
    Invalid(String),
}

pub const COMPUTER_ACCESSORIES: [&str; 4] = ["Mouse", "Keyboard", "Monitor", "Laptop Bag"];

pub const MOBILE_ACCESSORIES: [&str; 5] =
    ["Case/Cover", "Screen Protector", "Earbuds", "Charger", "Car Mount"];

pub const COMPANIES: [&str; 4] =
    ["RKS MOTOR", "BROADDCAST BUSINESS SOLUTIONS", "VERAVITA", "AUTOZONE"];

pub const DEPARTMENTS: [&str; 25] = [
    "Accounts",
    "Admin",
    "Audit",
    "Consultant",
    "F&B",
    "Front Office",
    "GST",
    "HR",
    "Housekeeping",
    "Kitchen",
    "Maintenance",
    "Operations",
    "Painter",
    "Purchase",
    "Sales",
    "Service",
    "Business Head",
    "Digital Marketing Manager",
    "Performance Marketing Executive",
    "Social Media Manager",
    "Graphic Designer",
    "SEO Executive",
    "Web Developer",
    "Operations Manager",
    "IT",
];

impl Default for AssetCatalog {
    fn default() -> Self {
        let owned = |items: &[&str]| items.iter().map(ToString::to_string).collect::<Vec<_>>();
        let kind = |key: &str, label: &str, icon: &str, shape: DetailShape, acc: &[&str]| {
            AssetKind {
                key: AssetKey::new(key),
                label: label.to_string(),
                icon: icon.to_string(),
                shape,
                accessories: owned(acc),
            }
        };

        Self {
            kinds: vec![
                kind("laptop", "Laptop", "laptop", DetailShape::Computer, &COMPUTER_ACCESSORIES),
                kind("desktop", "Desktop", "monitor", DetailShape::Computer, &COMPUTER_ACCESSORIES),
                kind("mobile", "Mobile Phone", "smartphone", DetailShape::Mobile, &MOBILE_ACCESSORIES),
                kind("tablet", "Tablet / iPad", "tablet", DetailShape::Computer, &COMPUTER_ACCESSORIES),
                kind("sim_card", "SIM Card", "sim", DetailShape::Sim, &[]),
                kind("headset", "Headset", "headphones", DetailShape::Brand, &[]),
                kind("other", "Other Assets", "package", DetailShape::Description, &[]),
            ],
            directory: OrgDirectory { companies: owned(&COMPANIES), departments: owned(&DEPARTMENTS) },
        }
    }
}

impl AssetCatalog {
    pub fn new(kinds: Vec<AssetKind>, directory: OrgDirectory) -> Result<Self, CatalogError> {
        let catalog = Self { kinds, directory };
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let raw = fs::read_to_string(path)
            .map_err(|source| CatalogError::ReadFile { path: path.to_path_buf(), source })?;
        let catalog = toml::from_str::<Self>(&raw)
            .map_err(|source| CatalogError::ParseFile { path: path.to_path_buf(), source })?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn kinds(&self) -> &[AssetKind] {
        &self.kinds
    }

    pub fn directory(&self) -> &OrgDirectory {
        &self.directory
    }

    pub fn get(&self, key: &AssetKey) -> Option<&AssetKind> {
        self.kinds.iter().find(|kind| &kind.key == key)
    }

    /// Resolves either a catalog key (`laptop`) or a display label (`Laptop`).
    pub fn resolve(&self, key_or_label: &str) -> Option<&AssetKind> {
        let needle = key_or_label.trim();
        self.kinds.iter().find(|kind| kind.key.as_str() == needle).or_else(|| {
            self.kinds.iter().find(|kind| kind.label.eq_ignore_ascii_case(needle))
        })
    }

    pub fn label_of<'a>(&'a self, key: &'a AssetKey) -> &'a str {
        self.get(key).map(|kind| kind.label.as_str()).unwrap_or(key.as_str())
    }

    fn validate(&self) -> Result<(), CatalogError> {
        if self.kinds.is_empty() {
            return Err(CatalogError::Invalid("at least one asset type is required".to_string()));
        }

        for (index, kind) in self.kinds.iter().enumerate() {
            if kind.key.as_str().trim().is_empty() || kind.label.trim().is_empty() {
                return Err(CatalogError::Invalid(format!(
                    "asset type #{index} needs a non-empty key and label"
                )));
            }
            let duplicate = self.kinds[..index]
                .iter()
                .any(|other| other.key == kind.key || other.label.eq_ignore_ascii_case(&kind.label));
            if duplicate {
                return Err(CatalogError::Invalid(format!(
                    "asset type `{}` is declared more than once",
                    kind.key
                )));
            }
        }

        if self.directory.companies.is_empty() || self.directory.departments.is_empty() {
            return Err(CatalogError::Invalid(
                "directory needs at least one company and one department".to_string(),
            ));
        }

        Ok(())
    }
}
