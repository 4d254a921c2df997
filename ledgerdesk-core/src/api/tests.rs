#[cfg(test)]
mod tests {
    use crate::api::{create_router, AppState, GateRegistry};
    use crate::config::AppConfig;
    use crate::error::PersistError;
    use crate::form::gate::DocumentSink;
    use crate::models::document::{Document, DocumentKind};
    use crate::store::DocumentStore;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use tower::ServiceExt;
    use uuid::Uuid;

    /// In-memory store; rejects every save while `reject` is set.
    #[derive(Default)]
    struct MemoryStore {
        docs: Mutex<HashMap<Uuid, (DocumentKind, Value)>>,
        reject: Option<String>,
    }

    #[async_trait]
    impl<D: Document> DocumentSink<D> for MemoryStore {
        async fn persist(&self, document: &D) -> Result<(), PersistError> {
            if let Some(reason) = &self.reject {
                return Err(PersistError::new(reason.clone()));
            }
            let id = document.id().ok_or_else(|| PersistError::new("missing id"))?;
            let body = serde_json::to_value(document).map_err(|e| PersistError::new(e.to_string()))?;
            self.docs.lock().unwrap().insert(id, (D::KIND, body));
            Ok(())
        }
    }

    #[async_trait]
    impl DocumentStore for MemoryStore {
        async fn load_body(&self, kind: DocumentKind, id: Uuid) -> anyhow::Result<Option<Value>> {
            Ok(self
                .docs
                .lock()
                .unwrap()
                .get(&id)
                .filter(|(k, _)| *k == kind)
                .map(|(_, body)| body.clone()))
        }
    }

    fn app(store: Arc<MemoryStore>) -> Router {
        // The pool is only touched by /health/db.
        let db = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/unused")
            .unwrap();
        create_router(AppState {
            db,
            config: Arc::new(AppConfig::default()),
            store,
            gates: GateRegistry::new(),
        })
    }

    async fn call(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(match body {
                Some(body) => Body::from(body.to_string()),
                None => Body::empty(),
            })
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    fn invoice_body() -> Value {
        json!({
            "invoice_number": "INV-1001",
            "customer_id": Uuid::new_v4(),
            "issue_date": "2024-06-10",
            "due_date": "2024-07-10",
            "lines": [
                { "description": "Design", "quantity": "2", "unit_price": "10.00" },
                { "description": "Gift card", "quantity": "1", "unit_price": "5.00", "taxable": false }
            ]
        })
    }

    fn state_rate() -> Value {
        json!({ "Id": Uuid::new_v4(), "Name": "State", "Rate": "0.08" })
    }

    #[tokio::test]
    async fn test_health_check() {
        let (status, body) = call(app(Arc::default()), "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["service"], "ledgerdesk-core");
    }

    #[tokio::test]
    async fn test_preview_recomputes_totals() {
        let (status, body) = call(
            app(Arc::default()),
            "POST",
            "/api/invoices/preview",
            Some(json!({ "document": invoice_body(), "tax_rate": state_rate() })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let totals = &body["document"]["totals"];
        assert_eq!(totals["subtotal"], "25.00");
        assert_eq!(totals["tax"], "1.60");
        assert_eq!(totals["total"], "26.60");
        assert_eq!(body["effective_rate"]["source"]["kind"], "manual");
        assert!(body.get("errors").is_none());
    }

    #[tokio::test]
    async fn test_preview_of_saved_document_uses_newly_selected_rate() {
        let mut invoice = invoice_body();
        invoice["totals"] = json!({
            "subtotal": "25.00",
            "taxable_subtotal": "20.00",
            "tax": "2.00",
            "total": "27.00",
            "tax_rate": "0.10"
        });

        let (_, kept) = call(
            app(Arc::default()),
            "POST",
            "/api/invoices/preview",
            Some(json!({ "document": invoice.clone() })),
        )
        .await;
        assert_eq!(kept["document"]["totals"]["tax"], "2.00");
        assert_eq!(kept["effective_rate"]["source"]["kind"], "stored");

        let (status, body) = call(
            app(Arc::default()),
            "POST",
            "/api/invoices/preview",
            Some(json!({ "document": invoice, "tax_rate": state_rate() })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["document"]["totals"]["tax"], "1.60");
        assert_eq!(body["document"]["totals"]["total"], "26.60");
        assert_eq!(body["effective_rate"]["source"]["kind"], "manual");
    }

    #[tokio::test]
    async fn test_validate_reports_field_errors() {
        let mut invoice = invoice_body();
        invoice["customer_id"] = Value::Null;
        invoice["lines"][0]["quantity"] = json!("0");

        let (status, body) = call(app(Arc::default()), "POST", "/api/invoices/validate", Some(invoice)).await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["errors"]["customer_id"], "Customer is required");
        assert_eq!(body["errors"]["lines[0].quantity"], "Quantity must be greater than 0");
    }

    #[tokio::test]
    async fn test_submit_saves_and_reads_back() {
        let store = Arc::new(MemoryStore::default());
        let (status, saved) = call(
            app(store.clone()),
            "POST",
            "/api/invoices",
            Some(json!({ "document": invoice_body(), "tax_rate": state_rate() })),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(saved["totals"]["total"], "26.60");
        assert_eq!(saved["lines"][0]["taxable"], true);
        let id = saved["id"].as_str().unwrap().to_string();

        let (status, loaded) = call(app(store.clone()), "GET", &format!("/api/invoices/{}", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(loaded["invoice_number"], "INV-1001");

        let (status, _) = call(app(store), "GET", &format!("/api/bills/{}", id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_invalid_submit_is_not_saved() {
        let store = Arc::new(MemoryStore::default());
        let mut invoice = invoice_body();
        invoice["invoice_number"] = json!("");

        let (status, body) = call(app(store.clone()), "POST", "/api/invoices", Some(json!({ "document": invoice }))).await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["errors"]["invoice_number"], "Invoice number is required");
        assert!(store.docs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_persistence_failure_returns_reason() {
        let store = Arc::new(MemoryStore {
            reject: Some("Could not save the bill. Please try again.".to_string()),
            ..MemoryStore::default()
        });
        let bill = json!({
            "vendor_id": Uuid::new_v4(),
            "bill_date": "2024-06-10",
            "lines": [{ "account_id": Uuid::new_v4(), "quantity": "1", "unit_price": "40" }]
        });

        let (status, body) = call(app(store), "POST", "/api/bills", Some(json!({ "document": bill }))).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Could not save the bill. Please try again.");
    }

    #[tokio::test]
    async fn test_mileage_preview_and_submit() {
        let store = Arc::new(MemoryStore::default());
        let request = json!({
            "trip": {
                "trip_date": "2024-06-01",
                "distance": "25.5",
                "round_trip": true,
                "purpose": "Client visit"
            },
            "rates": [{
                "Id": Uuid::new_v4(),
                "Category": "business",
                "EffectiveDate": "2024-01-01",
                "RatePerMile": "0.67"
            }]
        });

        let (status, preview) = call(app(store.clone()), "POST", "/api/mileage/preview", Some(request.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(preview["document"]["deductible_amount"], "34.17");

        let (status, saved) = call(app(store.clone()), "POST", "/api/mileage", Some(request)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(saved["deductible_amount"], "34.17");
        assert_eq!(store.docs.lock().unwrap().len(), 1);
    }
}
