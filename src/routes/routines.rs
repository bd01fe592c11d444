//! Admin endpoints for starting, listing and halting deletion routines.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use super::ApiError;
use crate::{
    AppState,
    engine::{BatchReport, RoutineId, RoutineSnapshot, StopReport},
    store::ChannelId,
};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecurringRequest {
    /// Channel id or mention to purge.
    pub channel: String,
    /// Maximum message age in days. Defaults to the configured value.
    pub days: Option<u32>,
    /// Channel that receives notices. Defaults to the purged channel.
    pub report_to: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IntervalRequest {
    pub channel: String,
    /// Lower bound, epoch seconds (exclusive).
    pub older: i64,
    /// Upper bound, epoch seconds (exclusive).
    pub younger: i64,
    pub report_to: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchRequest {
    /// JSON text: an array of `[max_age_days, channel]` pairs.
    pub batch: String,
    pub report_to: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListFormat {
    #[default]
    Json,
    Table,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    /// 1-based page number.
    pub page: Option<usize>,
    #[serde(default)]
    pub format: ListFormat,
}

#[derive(Debug, Serialize)]
pub struct RoutineList {
    pub routines: Vec<RoutineSnapshot>,
    pub page: usize,
    pub pages: usize,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct StopResponse {
    #[serde(flatten)]
    pub report: StopReport,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

fn report_channel(report_to: Option<String>) -> Option<ChannelId> {
    report_to
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .map(ChannelId::from)
}

fn seconds_to_ms(field: &str, seconds: i64) -> Result<i64, ApiError> {
    seconds
        .checked_mul(1000)
        .ok_or_else(|| ApiError::BadRequest(format!("{field} is out of range")))
}

/// Shortest id prefix accepted in place of a full id.
const MIN_ID_PREFIX: usize = 4;

/// Accept a full id or an unambiguous prefix of an active routine's id,
/// such as the short id shown in the status table.
fn resolve_id(state: &AppState, id: &str) -> Result<RoutineId, ApiError> {
    if let Ok(id) = id.parse() {
        return Ok(id);
    }

    let is_prefix = id.len() >= MIN_ID_PREFIX
        && id.chars().all(|c| c.is_ascii_hexdigit() || c == '-');
    if !is_prefix {
        return Err(ApiError::BadRequest(format!("Invalid routine id '{id}'")));
    }

    match state.engine.registry().find_by_prefix(id).as_slice() {
        [found] => Ok(*found),
        [] => Err(ApiError::NotFound(format!("No active routine matches '{id}'"))),
        matches => Err(ApiError::BadRequest(format!(
            "Routine id '{id}' is ambiguous ({} matches)",
            matches.len()
        ))),
    }
}

/// POST /v1/routines/recurring
pub async fn start_recurring(
    State(state): State<AppState>,
    Json(request): Json<RecurringRequest>,
) -> Result<(StatusCode, Json<RoutineSnapshot>), ApiError> {
    let snapshot = state
        .engine
        .start_recurring(
            &request.channel,
            request.days,
            report_channel(request.report_to),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(snapshot)))
}

/// POST /v1/routines/interval
///
/// Bounds arrive in seconds and are stored in milliseconds. An inverted
/// window is accepted here; the routine aborts and notifies.
pub async fn start_interval(
    State(state): State<AppState>,
    Json(request): Json<IntervalRequest>,
) -> Result<(StatusCode, Json<RoutineSnapshot>), ApiError> {
    let older = seconds_to_ms("older", request.older)?;
    let younger = seconds_to_ms("younger", request.younger)?;
    let snapshot = state
        .engine
        .start_interval(
            &request.channel,
            older,
            younger,
            report_channel(request.report_to),
        )
        .await?;
    Ok((StatusCode::ACCEPTED, Json(snapshot)))
}

/// POST /v1/routines/batch
pub async fn start_batch(
    State(state): State<AppState>,
    Json(request): Json<BatchRequest>,
) -> Result<Json<BatchReport>, ApiError> {
    let report = state
        .engine
        .launch_batch(&request.batch, report_channel(request.report_to))
        .await?;
    Ok(Json(report))
}

/// GET /v1/routines
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Response {
    let page = query.page.unwrap_or(1).max(1);

    if let ListFormat::Table = query.format {
        return (
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            state.engine.status_page(page),
        )
            .into_response();
    }

    let per_page = state.engine.config().report_page_size.max(1);
    let all = state.engine.list();
    let total = all.len();
    let pages = total.div_ceil(per_page).max(1);
    let page = page.min(pages);
    let routines = all
        .into_iter()
        .skip((page - 1) * per_page)
        .take(per_page)
        .collect();

    Json(RoutineList {
        routines,
        page,
        pages,
        total,
    })
    .into_response()
}

/// GET /v1/routines/{id}
pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RoutineSnapshot>, ApiError> {
    let id = resolve_id(&state, &id)?;
    state
        .engine
        .registry()
        .get(&id)
        .map(|routine| Json(routine.snapshot()))
        .ok_or_else(|| ApiError::NotFound(format!("Routine {id} is not active")))
}

/// DELETE /v1/routines/{id}
pub async fn cancel(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = resolve_id(&state, &id)?;
    if state.engine.cancel(&id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("Routine {id} is not active")))
    }
}

/// DELETE /v1/channels/{channel}/routines
pub async fn stop_channel(
    State(state): State<AppState>,
    Path(channel): Path<String>,
) -> Json<StopResponse> {
    let report = state.engine.stop_channel(&channel).await;
    let message = format!(
        "Halting {} message deletion routines in {}.",
        report.halted, report.channel_name
    );
    Json(StopResponse { report, message })
}

/// POST /v1/shutdown
pub async fn shutdown(State(state): State<AppState>) -> (StatusCode, Json<MessageResponse>) {
    tracing::info!("Shutdown requested over the admin API");
    state.shutdown.cancel();
    (
        StatusCode::ACCEPTED,
        Json(MessageResponse {
            message: "Shutting down...".to_string(),
        }),
    )
}
