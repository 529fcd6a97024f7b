pub mod status;

pub use crate::state::AppState;
