//! Field-level validation rules for every wizard step.
//!
//! Each check either returns the normalised (trimmed) value or a map from field
//! name to a message that can be shown next to that field. Callers decide whether
//! an error blocks advancement.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::assembler::BlockDraft;
use crate::catalog::OrgDirectory;
use crate::domain::asset::{
    AssetBlock, BrandBlock, ComputerBlock, DescriptionBlock, MobileBlock, SimBlock,
};
use crate::domain::employee::{Contact, Employee, EmployeeInput, Job, JobInput};

pub type FieldErrors = BTreeMap<String, String>;

pub const MAX_NAME_LEN: usize = 100;
pub const MAX_EMPLOYEE_ID_LEN: usize = 50;
pub const MAX_DESIGNATION_LEN: usize = 100;
pub const MAX_IMEI_LEN: usize = 15;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactField {
    #[default]
    Phone,
    Email,
}

impl std::str::FromStr for ContactField {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "phone" => Ok(Self::Phone),
            "email" => Ok(Self::Email),
            other => Err(format!("unsupported contact field `{other}` (expected phone|email)")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchemaOptions {
    pub contact: ContactField,
    pub name_letters_only: bool,
    pub require_images: bool,
}

impl Default for SchemaOptions {
    fn default() -> Self {
        Self { contact: ContactField::Phone, name_letters_only: true, require_images: true }
    }
}

#[derive(Clone, Debug)]
pub struct FieldSchemas {
    options: SchemaOptions,
    directory: OrgDirectory,
}

fn mobile_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[6-9][0-9]{9}$").expect("static mobile pattern"))
}

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("static email pattern"))
}

fn letters_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z\s]+$").expect("static name pattern"))
}

/// Ten digits, first digit 6-9.
pub fn is_mobile_number(value: &str) -> bool {
    mobile_pattern().is_match(value)
}

pub fn is_email(value: &str) -> bool {
    email_pattern().is_match(value)
}

impl FieldSchemas {
    pub fn new(options: SchemaOptions, directory: OrgDirectory) -> Self {
        Self { options, directory }
    }

    pub fn options(&self) -> &SchemaOptions {
        &self.options
    }

    pub fn directory(&self) -> &OrgDirectory {
        &self.directory
    }

    pub fn validate_employee(&self, input: &EmployeeInput) -> Result<Employee, FieldErrors> {
        let mut errors = FieldErrors::new();

        let full_name = input.full_name.trim();
        if full_name.is_empty() {
            errors.insert("fullName".into(), "Full name is required".into());
        } else if full_name.chars().count() > MAX_NAME_LEN {
            errors.insert(
                "fullName".into(),
                format!("Full name must be at most {MAX_NAME_LEN} characters"),
            );
        } else if self.options.name_letters_only && !letters_pattern().is_match(full_name) {
            errors.insert("fullName".into(), "Name must contain only letters".into());
        }

        let contact = input.contact.trim();
        let contact = match self.options.contact {
            ContactField::Phone if is_mobile_number(contact) => {
                Some(Contact::Phone(contact.to_string()))
            }
            ContactField::Phone => {
                errors.insert("contact".into(), "Enter a valid 10-digit mobile number".into());
                None
            }
            ContactField::Email if is_email(contact) => Some(Contact::Email(contact.to_string())),
            ContactField::Email => {
                errors.insert("contact".into(), "Enter a valid email address".into());
                None
            }
        };

        let employee_id = input.employee_id.trim();
        if employee_id.is_empty() {
            errors.insert("employeeId".into(), "Employee ID is required".into());
        } else if employee_id.chars().count() > MAX_EMPLOYEE_ID_LEN {
            errors.insert(
                "employeeId".into(),
                format!("Employee ID must be at most {MAX_EMPLOYEE_ID_LEN} characters"),
            );
        }

        match contact {
            Some(contact) if errors.is_empty() => Ok(Employee {
                full_name: full_name.to_string(),
                contact,
                employee_id: employee_id.to_string(),
            }),
            _ => Err(errors),
        }
    }

    pub fn validate_job(&self, input: &JobInput) -> Result<Job, FieldErrors> {
        let mut errors = FieldErrors::new();

        let company = input.company.trim();
        if company.is_empty() {
            errors.insert("company".into(), "Company is required".into());
        } else if !self.directory.has_company(company) {
            errors.insert("company".into(), "Select a company from the list".into());
        }

        let department = input.department.trim();
        if department.is_empty() {
            errors.insert("department".into(), "Department is required".into());
        } else if !self.directory.has_department(department) {
            errors.insert("department".into(), "Select a department from the list".into());
        }

        let designation = input.designation.trim();
        if designation.is_empty() {
            errors.insert("designation".into(), "Designation is required".into());
        } else if designation.chars().count() > MAX_DESIGNATION_LEN {
            errors.insert(
                "designation".into(),
                format!("Designation must be at most {MAX_DESIGNATION_LEN} characters"),
            );
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(Job {
            company: company.to_string(),
            department: department.to_string(),
            designation: designation.to_string(),
        })
    }

    /// Text rules for the block's shape plus the photo requirement for structured
    /// shapes. Out-of-catalog accessories are accepted as-is.
    pub fn validate_block(&self, draft: &BlockDraft) -> Result<AssetBlock, FieldErrors> {
        let mut errors = FieldErrors::new();

        let block = match draft {
            BlockDraft::Computer { brand, serial_number, accessories, images } => {
                let brand = required(&mut errors, "brand", brand, "Brand is required");
                let serial_number =
                    required(&mut errors, "serialNumber", serial_number, "Serial number is required");
                self.check_images(&mut errors, images.len());
                AssetBlock::Computer(ComputerBlock {
                    brand,
                    serial_number,
                    accessories: accessories.clone(),
                    images: images.clone(),
                })
            }
            BlockDraft::Mobile { brand, imei_number, accessories, images } => {
                let brand = required(&mut errors, "brand", brand, "Brand is required");
                let imei_number = required(&mut errors, "imeiNumber", imei_number, "IMEI is required");
                if imei_number.chars().count() > MAX_IMEI_LEN {
                    errors.insert(
                        "imeiNumber".into(),
                        format!("IMEI must be at most {MAX_IMEI_LEN} characters"),
                    );
                }
                self.check_images(&mut errors, images.len());
                AssetBlock::Mobile(MobileBlock {
                    brand,
                    imei_number,
                    accessories: accessories.clone(),
                    images: images.clone(),
                })
            }
            BlockDraft::Sim { sim_number } => {
                let sim_number = sim_number.trim().to_string();
                if !is_mobile_number(&sim_number) {
                    errors.insert("simNumber".into(), "Enter a valid 10-digit SIM number".into());
                }
                AssetBlock::Sim(SimBlock { sim_number })
            }
            BlockDraft::Brand { brand } => {
                let brand = required(&mut errors, "brand", brand, "Brand is required");
                AssetBlock::Brand(BrandBlock { brand })
            }
            BlockDraft::Description { description } => {
                let description =
                    required(&mut errors, "description", description, "Description is required");
                AssetBlock::Description(DescriptionBlock { description })
            }
        };

        if errors.is_empty() {
            Ok(block)
        } else {
            Err(errors)
        }
    }

    fn check_images(&self, errors: &mut FieldErrors, count: usize) {
        if self.options.require_images && count == 0 {
            errors.insert("images".into(), "Upload at least one image".into());
        }
    }
}

fn required(errors: &mut FieldErrors, field: &str, value: &str, message: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        errors.insert(field.to_string(), message.to_string());
    }
    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use crate::assembler::BlockDraft;
    use crate::catalog::AssetCatalog;
    use crate::domain::asset::{AssetBlock, ImageRef};
    use crate::domain::employee::{Contact, EmployeeInput, JobInput};

    use super::{is_mobile_number, ContactField, FieldSchemas, SchemaOptions};

    fn schemas(options: SchemaOptions) -> FieldSchemas {
        FieldSchemas::new(options, AssetCatalog::default().directory().clone())
    }

    #[test]
    fn mobile_pattern_requires_ten_digits_starting_six_to_nine() {
        assert!(is_mobile_number("9876543210"));
        assert!(!is_mobile_number("5876543210"));
        assert!(!is_mobile_number("987654321"));
        assert!(!is_mobile_number("98765432101"));
        assert!(!is_mobile_number("98765o3210"));
    }

    #[test]
    fn mobile_pattern_rejects_non_ascii_digits() {
        let arabic_indic = "9\u{0668}\u{0667}\u{0666}\u{0665}\u{0664}\u{0663}\u{0662}\u{0661}\u{0660}";
        let devanagari = "\u{096F}\u{096E}\u{096D}\u{096C}\u{096B}\u{096A}\u{0969}\u{0968}\u{0967}\u{0966}";
        assert!(!is_mobile_number(arabic_indic));
        assert!(!is_mobile_number(devanagari));

        let errors = schemas(SchemaOptions::default())
            .validate_block(&BlockDraft::Sim { sim_number: arabic_indic.to_string() })
            .expect_err("non-ascii sim number");
        assert_eq!(
            errors.get("simNumber").map(String::as_str),
            Some("Enter a valid 10-digit SIM number")
        );
    }

    #[test]
    fn employee_values_are_trimmed() {
        let employee = schemas(SchemaOptions::default())
            .validate_employee(&EmployeeInput {
                full_name: "  Jane Roe ".to_string(),
                contact: "9123456789 ".to_string(),
                employee_id: " EMP-100".to_string(),
            })
            .expect("valid employee");

        assert_eq!(employee.full_name, "Jane Roe");
        assert_eq!(employee.contact, Contact::Phone("9123456789".to_string()));
        assert_eq!(employee.employee_id, "EMP-100");
    }

    #[test]
    fn employee_errors_are_reported_per_field() {
        let errors = schemas(SchemaOptions::default())
            .validate_employee(&EmployeeInput {
                full_name: "R2 D2".to_string(),
                contact: "12345".to_string(),
                employee_id: String::new(),
            })
            .expect_err("invalid employee");

        assert_eq!(errors.get("fullName").map(String::as_str), Some("Name must contain only letters"));
        assert_eq!(
            errors.get("contact").map(String::as_str),
            Some("Enter a valid 10-digit mobile number")
        );
        assert_eq!(errors.get("employeeId").map(String::as_str), Some("Employee ID is required"));
    }

    #[test]
    fn email_deployments_validate_contact_as_email() {
        let options = SchemaOptions {
            contact: ContactField::Email,
            name_letters_only: false,
            ..SchemaOptions::default()
        };
        let schemas = schemas(options);

        let employee = schemas
            .validate_employee(&EmployeeInput {
                full_name: "O'Neil 3rd".to_string(),
                contact: "jane.roe@company.com".to_string(),
                employee_id: "EMP-7".to_string(),
            })
            .expect("letters-only rule disabled");
        assert_eq!(employee.contact, Contact::Email("jane.roe@company.com".to_string()));

        let errors = schemas
            .validate_employee(&EmployeeInput {
                full_name: "Jane".to_string(),
                contact: "9123456789".to_string(),
                employee_id: "EMP-7".to_string(),
            })
            .expect_err("phone is not an email");
        assert!(errors.contains_key("contact"));
    }

    #[test]
    fn job_requires_directory_values() {
        let schemas = schemas(SchemaOptions::default());
        let job = schemas
            .validate_job(&JobInput {
                company: "AUTOZONE".to_string(),
                department: "IT".to_string(),
                designation: " Engineer ".to_string(),
            })
            .expect("valid job");
        assert_eq!(job.designation, "Engineer");

        let errors = schemas
            .validate_job(&JobInput {
                company: "Globex".to_string(),
                department: String::new(),
                designation: "x".repeat(101),
            })
            .expect_err("invalid job");
        assert_eq!(errors.len(), 3);
        assert_eq!(errors["department"], "Department is required");
    }

    #[test]
    fn structured_block_needs_an_image_only_in_strict_mode() {
        let draft = BlockDraft::Computer {
            brand: "Dell".to_string(),
            serial_number: "SN123".to_string(),
            accessories: Default::default(),
            images: Vec::new(),
        };

        let strict = schemas(SchemaOptions::default());
        let errors = strict.validate_block(&draft).expect_err("images required");
        assert_eq!(errors.keys().collect::<Vec<_>>(), vec!["images"]);

        let lenient = schemas(SchemaOptions { require_images: false, ..SchemaOptions::default() });
        assert!(lenient.validate_block(&draft).is_ok());
    }

    #[test]
    fn imei_longer_than_fifteen_characters_is_rejected() {
        let draft = BlockDraft::Mobile {
            brand: "Apple".to_string(),
            imei_number: "1234567890123456".to_string(),
            accessories: ["Mystery Gadget".to_string()].into_iter().collect(),
            images: vec![ImageRef("https://cdn.example/p.png".to_string())],
        };

        let errors = schemas(SchemaOptions::default()).validate_block(&draft).expect_err("long imei");
        assert_eq!(errors["imeiNumber"], "IMEI must be at most 15 characters");
    }

    #[test]
    fn simple_blocks_follow_their_key_specific_rule() {
        let schemas = schemas(SchemaOptions::default());

        let sim = schemas
            .validate_block(&BlockDraft::Sim { sim_number: "9876543210".to_string() })
            .expect("valid sim");
        assert!(matches!(sim, AssetBlock::Sim(_)));
        assert!(schemas.validate_block(&BlockDraft::Sim { sim_number: "5876543210".to_string() }).is_err());
        assert!(schemas.validate_block(&BlockDraft::Sim { sim_number: "987654321".to_string() }).is_err());

        assert!(schemas.validate_block(&BlockDraft::Brand { brand: "  ".to_string() }).is_err());
        assert!(schemas
            .validate_block(&BlockDraft::Description { description: "Docking station".to_string() })
            .is_ok());
    }
}
