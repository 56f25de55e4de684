use axum::{extract::State, response::Json};
use serde::Serialize;
use tracing::debug;

use crate::store::RecordCounts;
use crate::{AppResult, AppState};

#[derive(Debug, Serialize)]
pub struct Dashboard {
    #[serde(flatten)]
    pub counts: RecordCounts,
    pub timezone: String,
}

/// GET /admin/dashboard
pub async fn dashboard(State(state): State<AppState>) -> AppResult<Json<Dashboard>> {
    debug!("Handling GET /admin/dashboard");
    let counts = state.io("records.count", state.store.counts()).await?;
    Ok(Json(Dashboard {
        counts,
        timezone: state.engine.config().timezone.name().to_string(),
    }))
}
