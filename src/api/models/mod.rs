pub mod status;

pub use status::{HistoryRow, HourRow, ScheduleView, StatusView};
