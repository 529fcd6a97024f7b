use axum::{extract::State, response::Html};
use chrono::Utc;

use crate::api::models::StatusView;
use crate::api::views::render_status;

use super::AppState;

/// Rows of control history shown on the page
const HISTORY_ROWS: usize = 24;

/// GET /
/// Current schedule, cached spa temperatures and override state. Never fails:
/// an unreachable spa renders as unavailable.
pub async fn status_page(State(state): State<AppState>) -> Html<String> {
    let now = Utc::now();

    let schedule = state.current_schedule().await;
    let spa = state.spa_status().await;
    let override_until = state.override_window.read().await.until();
    let history: Vec<_> = state
        .history
        .read()
        .await
        .recent(HISTORY_ROWS)
        .cloned()
        .collect();

    let view = StatusView::build(
        now,
        &state.control,
        schedule.as_deref(),
        spa,
        override_until,
        &history,
    );

    Html(render_status(&view))
}
