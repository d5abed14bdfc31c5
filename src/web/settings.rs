//! Settings routes and the date-input preview.

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use super::AppState;
use crate::error::Result;
use crate::identity::CurrentUser;
use crate::settings::{SettingsUpdate, SettingsView};
use crate::timezone;

#[derive(Debug, Deserialize)]
struct PreviewParams {
    #[serde(default)]
    text: String,
}

/// GET /settings
async fn get_settings(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
) -> Result<Json<SettingsView>> {
    let settings = state.settings.get_or_create(&identity).await?;
    Ok(Json(SettingsView::from(&settings)))
}

/// POST /settings
async fn update_settings(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    Json(update): Json<SettingsUpdate>,
) -> Result<Json<SettingsView>> {
    let settings = state.settings.update(&identity, &update).await?;
    Ok(Json(SettingsView::from(&settings)))
}

/// GET /date/preview?text=..
///
/// Echoes free-text date input back in canonical form, in the caller's zone.
async fn preview_date(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    Query(params): Query<PreviewParams>,
) -> Result<Json<serde_json::Value>> {
    let settings = state.settings.get_or_create(&identity).await?;
    let text = timezone::preview(&params.text, &settings.timezone)?;
    Ok(Json(serde_json::json!({ "text": text })))
}

pub fn settings_routes() -> Router<AppState> {
    Router::new()
        .route("/settings", get(get_settings).post(update_settings))
        .route("/date/preview", get(preview_date))
}
