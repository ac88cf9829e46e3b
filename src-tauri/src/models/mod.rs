// Data models (structs)
pub mod auth;
pub mod job;
pub mod job_form;
pub mod report;
pub mod settings;

pub use auth::*;
pub use job::*;
pub use job_form::*;
pub use report::*;
pub use settings::*;
