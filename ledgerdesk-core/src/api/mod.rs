pub mod error;
pub mod gates;
pub mod handlers;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use sqlx::PgPool;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::AppConfig;
use crate::form::gate::DocumentSink;
use crate::models::document::{Bill, Estimate, Expense, Invoice, LineDocument, PurchaseOrder};
use crate::store::DocumentStore;

pub use error::ApiError;
pub use gates::{GateLease, GateRegistry};

/// Shared state handed to every route handler.
#[derive(Clone)]
pub struct AppState {
    /// PostgreSQL connection pool
    pub db: PgPool,
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn DocumentStore>,
    /// Submission gates of the documents currently being saved
    pub gates: GateRegistry,
}

/// Creates the main application router.
///
/// Mounts the health routes and one route table per document kind under
/// `/api`, then wraps everything in tracing and CORS middleware.
///
/// # Arguments
///
/// * `state` - Database pool, configuration, document store and gate registry
///
/// # Returns
///
/// Returns a configured Axum Router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/health/db", get(handlers::db_health_check))
        .nest("/api/invoices", document_routes::<Invoice>())
        .nest("/api/estimates", document_routes::<Estimate>())
        .nest("/api/bills", document_routes::<Bill>())
        .nest("/api/purchase-orders", document_routes::<PurchaseOrder>())
        .nest("/api/expenses", document_routes::<Expense>())
        .nest("/api/mileage", mileage_routes())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

fn document_routes<D: LineDocument>() -> Router<AppState>
where
    dyn DocumentStore: DocumentSink<D>,
{
    Router::new()
        .route("/", post(handlers::submit_document::<D>))
        .route("/validate", post(handlers::validate_document::<D>))
        .route("/preview", post(handlers::preview_document::<D>))
        .route("/:id", get(handlers::get_document::<D>))
}

fn mileage_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::submit_mileage))
        .route("/preview", post(handlers::preview_mileage))
        .route("/:id", get(handlers::get_document::<crate::models::MileageTrip>))
}
