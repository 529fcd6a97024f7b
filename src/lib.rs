pub mod api;
pub mod config;
pub mod control;
pub mod controlmyspa;
pub mod error;
pub mod history;
pub mod jobs;
pub mod override_window;
pub mod porssari;
pub mod retry;
pub mod schedule;
pub mod scheduler;
pub mod state;

// Re-export commonly used items
pub use config::Config;
pub use error::{AppError, Result};
pub use state::AppState;
