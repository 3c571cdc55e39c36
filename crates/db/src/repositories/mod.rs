//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async query methods.
//! Reads take `&PgPool`; writes that must land inside a caller's
//! transaction take `&mut PgConnection` (pass `&mut *tx`).

pub mod employee_repo;
pub mod lead_repo;
pub mod sequence_repo;
pub mod task_repo;
pub mod team_assignment_repo;
pub mod template_repo;
pub mod workflow_repo;

pub use employee_repo::EmployeeRepo;
pub use lead_repo::LeadRepo;
pub use sequence_repo::SequenceRepo;
pub use task_repo::TaskRepo;
pub use team_assignment_repo::TeamAssignmentRepo;
pub use template_repo::TemplateRepo;
pub use workflow_repo::WorkflowRepo;
