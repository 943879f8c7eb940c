pub mod aggregate;
pub mod assemble;
pub mod countries;
pub mod extract;
pub mod generate;
pub mod orchestrator;
pub mod prompt;
pub mod table;

pub use generate::ReportGenerator;
pub use orchestrator::{FailurePolicy, PacingPolicy, RunOptions, run};
