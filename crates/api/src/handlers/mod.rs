pub mod employees;
pub mod sequence_assignments;
pub mod sequences;
pub mod tasks;
pub mod templates;
pub mod workflows;
