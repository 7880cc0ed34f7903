pub mod asset;
pub mod employee;
pub mod submission;
