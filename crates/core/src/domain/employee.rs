use serde::{Deserialize, Serialize};

/// How the employee can be reached. A deployment collects exactly one of these.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Contact {
    Phone(String),
    Email(String),
}

impl Contact {
    pub fn value(&self) -> &str {
        match self {
            Self::Phone(value) | Self::Email(value) => value,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Employee {
    pub full_name: String,
    pub contact: Contact,
    pub employee_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub company: String,
    pub department: String,
    pub designation: String,
}

/// Raw employee step values as typed into the form.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmployeeInput {
    pub full_name: String,
    pub contact: String,
    pub employee_id: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobInput {
    pub company: String,
    pub department: String,
    pub designation: String,
}

impl From<&Employee> for EmployeeInput {
    fn from(employee: &Employee) -> Self {
        Self {
            full_name: employee.full_name.clone(),
            contact: employee.contact.value().to_string(),
            employee_id: employee.employee_id.clone(),
        }
    }
}

impl From<&Job> for JobInput {
    fn from(job: &Job) -> Self {
        Self {
            company: job.company.clone(),
            department: job.department.clone(),
            designation: job.designation.clone(),
        }
    }
}
