use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Deserialize;
use tracing::{error, info, warn};

use ggstats_common::{MatchId, MatchRecord, RoundId};
use ggstats_sync::commit;

use crate::processor::{ProcessError, ProcessOutcome};
use crate::AppState;

fn error_response(status: StatusCode, message: impl Into<String>) -> axum::response::Response {
    (
        status,
        Json(serde_json::json!({ "status": "error", "error": message.into() })),
    )
        .into_response()
}

// --- Sync ---

pub async fn api_last_sync(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.ledger.watermark().await {
        Ok(watermark) => Json(serde_json::json!({ "lastSync": watermark.as_millis() })).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to read sync watermark");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch last sync timestamp.")
        }
    }
}

/// Accepts an array of resolved duels and commits them. Anything that is
/// not an array, and any element that is not a usable duel, is ignored.
pub async fn api_sync(
    State(state): State<Arc<AppState>>,
    Json(body): Json<serde_json::Value>,
) -> impl IntoResponse {
    let serde_json::Value::Array(items) = body else {
        warn!("Sync payload is not an array, nothing to do");
        return Json(serde_json::json!({
            "status": "success",
            "addedCount": 0,
            "roundsToProcess": [],
        }))
        .into_response();
    };

    let received = items.len();
    let records: Vec<MatchRecord> = items
        .into_iter()
        .filter_map(|item| match MatchRecord::from_json(item) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(error = %e, "Ignoring unusable duel in sync payload");
                None
            }
        })
        .collect();

    let candidate = records.iter().map(|r| r.created_watermark()).max();

    let _guard = state.sync_lock.lock().await;
    let result: anyhow::Result<_> = async {
        let current = state.ledger.watermark().await?;
        commit(state.ledger.as_ref(), &records, current, candidate).await
    }
    .await;

    match result {
        Ok(outcome) => {
            info!(
                received,
                added = outcome.added_count(),
                rounds = outcome.rounds_to_process.len(),
                "Sync payload committed"
            );
            let rounds: Vec<String> = outcome.rounds_to_process.iter().map(|r| r.to_string()).collect();
            Json(serde_json::json!({
                "status": "success",
                "addedCount": outcome.added_count(),
                "roundsToProcess": rounds,
                "lastSync": outcome.watermark.as_millis(),
            }))
            .into_response()
        }
        Err(e) => {
            error!(error = ?e, "Sync commit failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}"))
        }
    }
}

// --- Enrichment ---

#[derive(Deserialize)]
pub struct ProcessRoundRequest {
    #[serde(rename = "roundId")]
    round_id: Option<String>,
}

pub async fn api_process_round(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ProcessRoundRequest>,
) -> impl IntoResponse {
    let Some(raw) = body.round_id.filter(|s| !s.is_empty()) else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid request body, expected a roundId.");
    };
    let round_id: RoundId = match raw.parse() {
        Ok(id) => id,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
    };

    info!(round_id = %round_id, "Processing round");

    match state.processor.process(&round_id).await {
        Ok(ProcessOutcome::AlreadyEnriched) => Json(serde_json::json!({
            "status": "success",
            "message": format!("Skipped {round_id}, already exists."),
        }))
        .into_response(),
        Ok(ProcessOutcome::MissingPanorama) => Json(serde_json::json!({
            "status": "success",
            "message": format!("Skipped {round_id}, missing data."),
        }))
        .into_response(),
        Ok(ProcessOutcome::Enriched { dimensions }) => Json(serde_json::json!({
            "status": "success",
            "message": format!("Processed {round_id}"),
            "processed": round_id.to_string(),
            "dimensions": dimensions,
        }))
        .into_response(),
        Err(e @ ProcessError::UnknownRound(_)) => error_response(StatusCode::NOT_FOUND, e.to_string()),
        Err(e @ ProcessError::NotConfigured) => {
            error_response(StatusCode::SERVICE_UNAVAILABLE, e.to_string())
        }
        Err(e) => {
            error!(round_id = %round_id, error = %e, "Failed to process round");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to process round.")
        }
    }
}

pub async fn api_embedding_count(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.embeddings.embedding_count().await {
        Ok(count) => Json(serde_json::json!({ "count": count })).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to count embeddings");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to count embeddings.")
        }
    }
}

// --- Duels ---

pub async fn api_duels(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.ledger.all().await {
        Ok(records) => Json(records).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to list duels");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch duels.")
        }
    }
}

pub async fn api_duel_detail(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.ledger.get(&MatchId::from(id)).await {
        Ok(Some(record)) => Json(record).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "Duel not found"),
        Err(e) => {
            error!(error = %e, "Failed to fetch duel");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch duel.")
        }
    }
}
