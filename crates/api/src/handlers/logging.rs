//! Logging category inspection and control.

use std::collections::BTreeMap;

use axum::extract::{Query, State};
use axum::Json;

use diag_core::error::CoreError;
use diag_core::logging::LoggingCategoriesSnapshot;

use crate::error::AppResult;
use crate::logging::CategoryChange;
use crate::state::AppState;

/// Query key carrying a filter-grammar token instead of a category name.
const FILTER_KEY: &str = "filter";

/// GET /debug/logging-categories
///
/// Without parameters returns the current levels. Each `?<category>=<level>`
/// pair sets that category; `?filter=<token>` applies one filter token such
/// as `NoDeviceManager`. The request is applied as a whole: one invalid
/// entry rejects it and nothing changes.
pub async fn logging_categories(
    State(state): State<AppState>,
    Query(params): Query<BTreeMap<String, String>>,
) -> AppResult<Json<LoggingCategoriesSnapshot>> {
    if params.is_empty() {
        return Ok(Json(state.logging.snapshot()));
    }

    let changes = params
        .into_iter()
        .map(|(key, value)| {
            if key == FILTER_KEY {
                Ok(CategoryChange::Filter(value))
            } else {
                Ok(CategoryChange::level(key, value.parse()?))
            }
        })
        .collect::<Result<Vec<_>, CoreError>>()?;

    Ok(Json(state.logging.apply_changes(&changes)?))
}
