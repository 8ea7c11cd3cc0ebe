use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::HeaderMap;
use axum::Json;
use bytes::Bytes;
use tracing::instrument;

use crate::api::{HealthResponse, IngestError, IngestResponse};
use crate::gateway::{SaveOutcome, StorageKind};
use crate::normalize::{normalize_json, normalize_text, Payload};
use crate::prometheus::report_received_records;
use crate::router;

#[instrument(skip_all, fields(content_type, format, records))]
pub async fn device_push(
    State(state): State<router::State>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<IngestResponse>, IngestError> {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok());
    tracing::Span::current().record("content_type", content_type.unwrap_or("unknown"));

    let payload = Payload::from_bytes(content_type, &body).map_err(|err| {
        tracing::warn!("rejected malformed payload: {}", err);
        err
    })?;
    tracing::Span::current().record("format", payload.format());

    match payload {
        Payload::Json(data) => {
            tracing::debug!(data = %data, "received JSON push");
            tracing::Span::current().record("records", 1);
            report_received_records("json", 1);

            let record = normalize_json(data, state.timesource.as_ref());
            match state.gateway.save(record).await {
                SaveOutcome::Stored { id, storage } => Ok(Json(IngestResponse {
                    success: true,
                    message: stored_message(storage).to_owned(),
                    id: Some(id),
                })),
                SaveOutcome::Dropped { error } => Err(IngestError::StorageFailed(error)),
            }
        }
        Payload::Text(text) => {
            tracing::debug!(body = %text, "received plain text push");
            let records = normalize_text(&text);
            let count = records.len();
            tracing::Span::current().record("records", count);
            report_received_records("text", count as u64);

            let mut dropped = None;
            for record in records {
                if let SaveOutcome::Dropped { error } = state.gateway.save(record).await {
                    dropped.get_or_insert(error);
                }
            }
            if let Some(error) = dropped {
                return Err(IngestError::StorageFailed(error));
            }

            Ok(Json(IngestResponse {
                success: true,
                message: format!("Processed {count} records from plain text data"),
                id: None,
            }))
        }
    }
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_owned(),
    })
}

fn stored_message(storage: StorageKind) -> &'static str {
    match storage {
        StorageKind::Primary => "Data saved to document store",
        StorageKind::Fallback => "Data saved to memory storage",
    }
}
