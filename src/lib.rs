pub mod api;
pub mod clock;
pub mod config;
pub mod database;
pub mod errors;
pub mod logging;
pub mod models;
pub mod scheduler;
pub mod study_service;

pub use clock::{Clock, FixedClock, SystemClock};
pub use database::Database;
pub use errors::*;
pub use models::*;
pub use scheduler::SM2Scheduler;
pub use study_service::StudyService;
