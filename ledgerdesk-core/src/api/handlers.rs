use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use super::{ApiError, AppState};
use crate::config::TaxPrecedence;
use crate::form::document::DocumentForm;
use crate::form::gate::DocumentSink;
use crate::form::mileage::MileageForm;
use crate::form::schema::ValidationErrors;
use crate::form::totals::EffectiveRate;
use crate::models::document::{Document, LineDocument};
use crate::models::mileage::MileageTrip;
use crate::models::reference::{MileageRate, TaxRate};
use crate::store::DocumentStore;
use crate::tax::AutoTaxRate;

/// Body of preview and submit requests for line documents.
#[derive(Debug, Deserialize)]
#[serde(bound = "D: LineDocument")]
pub struct DocumentRequest<D> {
    pub document: D,
    /// Manually selected tax rate entity
    #[serde(default)]
    pub tax_rate: Option<TaxRate>,
    /// Rate from the auto-calculation lookup
    #[serde(default)]
    pub auto_rate: Option<AutoTaxRate>,
}

impl<D: LineDocument> DocumentRequest<D> {
    fn into_form(self, precedence: TaxPrecedence) -> DocumentForm<D> {
        let mut form = DocumentForm::load(self.document, precedence);
        if self.tax_rate.is_some() {
            form.select_tax_rate(self.tax_rate);
        }
        if self.auto_rate.is_some() {
            form.set_auto_rate(self.auto_rate);
        }
        form
    }
}

#[derive(Debug, Serialize)]
#[serde(bound = "D: Serialize")]
pub struct PreviewResponse<D> {
    /// The document with recomputed totals
    pub document: D,
    pub effective_rate: EffectiveRate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<ValidationErrors>,
}

#[derive(Debug, Deserialize)]
pub struct MileageRequest {
    pub trip: MileageTrip,
    #[serde(default)]
    pub rates: Vec<MileageRate>,
}

/// Health check endpoint.
///
/// Returns a simple JSON response indicating the server is running.
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "ledgerdesk-core",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Database health check endpoint.
///
/// Verifies that the database connection is working by executing
/// a simple query.
pub async fn db_health_check(State(state): State<AppState>) -> Result<Json<serde_json::Value>, StatusCode> {
    sqlx::query("SELECT 1")
        .execute(&state.db)
        .await
        .map_err(|e| {
            error!("Database health check failed: {}", e);
            StatusCode::SERVICE_UNAVAILABLE
        })?;

    Ok(Json(serde_json::json!({
        "status": "ok",
        "database": "connected"
    })))
}

/// `POST /api/{kind}/validate`: whole-document validation only.
pub async fn validate_document<D: LineDocument>(
    Json(document): Json<D>,
) -> Result<Json<serde_json::Value>, ApiError> {
    document.validate().map_err(ApiError::Invalid)?;
    Ok(Json(serde_json::json!({ "valid": true })))
}

/// `POST /api/{kind}/preview`: recomputes totals for the posted lines and rates.
pub async fn preview_document<D: LineDocument>(
    State(state): State<AppState>,
    Json(request): Json<DocumentRequest<D>>,
) -> Json<PreviewResponse<D>> {
    let form = request.into_form(state.config.tax_precedence);
    let document = form.snapshot();
    Json(PreviewResponse {
        errors: document.validate().err(),
        effective_rate: form.effective_rate(),
        document,
    })
}

/// `POST /api/{kind}`: recompute, validate and save through the submission gate.
///
/// A document without an id gets a fresh one before it is saved. Requests
/// for the same id share one gate while a save is running.
///
/// # Arguments
///
/// * `state` - Application state holding the store and the gate registry
/// * `request` - The document plus the selected and auto-calculated rates
///
/// # Returns
///
/// Returns `201 Created` with the saved document, `422` with field errors,
/// `409` while another save of the same document is running, or `500` with
/// the persistence failure reason.
pub async fn submit_document<D: LineDocument>(
    State(state): State<AppState>,
    Json(request): Json<DocumentRequest<D>>,
) -> Result<(StatusCode, Json<D>), ApiError>
where
    dyn DocumentStore: DocumentSink<D>,
{
    let mut form = request.into_form(state.config.tax_precedence);
    let id = form.document().id().unwrap_or_else(Uuid::new_v4);
    form.edit_header(|d| d.set_id(id));

    let lease = state.gates.acquire(id);
    let saved = form.submit(lease.gate(), state.store.as_ref()).await?;

    info!("Created {} {} totalling {}", D::KIND, id, saved.amount());
    Ok((StatusCode::CREATED, Json(saved)))
}

/// `GET /api/{kind}/{id}`
///
/// # Returns
///
/// Returns the saved document, or `404` when no document of this kind is
/// stored under `id`.
pub async fn get_document<D: Document>(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<D>, ApiError> {
    let body = state
        .store
        .load_body(D::KIND, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("{} {} not found", D::KIND.label(), id)))?;
    let document = serde_json::from_value(body).map_err(anyhow::Error::from)?;
    Ok(Json(document))
}

/// `POST /api/mileage/preview`
pub async fn preview_mileage(Json(request): Json<MileageRequest>) -> Json<PreviewResponse<MileageTrip>> {
    let form = MileageForm::load(request.trip, request.rates);
    let trip = form.snapshot();
    Json(PreviewResponse {
        errors: trip.validate().err(),
        effective_rate: EffectiveRate::zero(),
        document: trip,
    })
}

/// `POST /api/mileage`
pub async fn submit_mileage(
    State(state): State<AppState>,
    Json(request): Json<MileageRequest>,
) -> Result<(StatusCode, Json<MileageTrip>), ApiError> {
    let today = Utc::now().date_naive();
    let mut trip = request.trip;
    let id = trip.id.unwrap_or_else(Uuid::new_v4);
    trip.id = Some(id);
    if trip.trip_date.is_unset() {
        trip.trip_date = today.into();
    }

    let mut form = MileageForm::load(trip, request.rates);
    let lease = state.gates.acquire(id);
    let saved = form.submit(lease.gate(), state.store.as_ref()).await?;

    info!("Logged mileage trip {} deductible {}", id, saved.deductible_amount);
    Ok((StatusCode::CREATED, Json(saved)))
}
