use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{error, info};
use uuid::Uuid;

use crate::error::PersistError;
use crate::form::gate::DocumentSink;
use crate::models::document::{
    Bill, Document, DocumentKind, Estimate, Expense, Invoice, PurchaseOrder,
};
use crate::models::mileage::MileageTrip;

/// Persistence for every kind the HTTP surface accepts.
#[async_trait]
pub trait DocumentStore:
    DocumentSink<Invoice>
    + DocumentSink<Estimate>
    + DocumentSink<Bill>
    + DocumentSink<PurchaseOrder>
    + DocumentSink<Expense>
    + DocumentSink<MileageTrip>
{
    /// Stored JSON body of a document, if one of `kind` exists under `id`.
    async fn load_body(&self, kind: DocumentKind, id: Uuid) -> anyhow::Result<Option<serde_json::Value>>;
}

/// Postgres-backed persistence for every document kind.
///
/// Documents are stored whole in `documents.body`; `kind` and `amount` are
/// copied out next to it.
#[derive(Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Loads a saved document of kind `D`.
    ///
    /// # Arguments
    ///
    /// * `id` - Document id
    ///
    /// # Returns
    ///
    /// Returns `None` when nothing is stored under `id` or the row belongs to
    /// another kind.
    pub async fn fetch<D: Document>(&self, id: Uuid) -> anyhow::Result<Option<D>> {
        match self.load_body(D::KIND, id).await? {
            Some(body) => Ok(Some(serde_json::from_value(body)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn load_body(&self, kind: DocumentKind, id: Uuid) -> anyhow::Result<Option<serde_json::Value>> {
        let body = sqlx::query_scalar::<_, serde_json::Value>(
            r#"
            SELECT body FROM documents
            WHERE id = $1 AND kind = $2
            "#,
        )
        .bind(id)
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(body)
    }
}

fn save_failed<D: Document>() -> PersistError {
    PersistError::new(format!(
        "Could not save the {}. Please try again.",
        D::KIND.label()
    ))
}

#[async_trait]
impl<D: Document> DocumentSink<D> for PgDocumentStore {
    /// Upserts the document by id.
    ///
    /// # Returns
    ///
    /// Returns a [`PersistError`] with a user-facing reason when the document
    /// has no id, the id belongs to another kind, or the database rejects it.
    async fn persist(&self, document: &D) -> Result<(), PersistError> {
        let Some(id) = document.id() else {
            error!("Refusing to save {} without an id", D::KIND);
            return Err(save_failed::<D>());
        };

        let body = serde_json::to_value(document).map_err(|e| {
            error!("Failed to serialize {} {}: {}", D::KIND, id, e);
            save_failed::<D>()
        })?;

        let result = sqlx::query(
            r#"
            INSERT INTO documents (id, kind, amount, body)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE SET
                amount = EXCLUDED.amount,
                body = EXCLUDED.body,
                updated_at = NOW()
            WHERE documents.kind = EXCLUDED.kind
            "#,
        )
        .bind(id)
        .bind(D::KIND.as_str())
        .bind(document.amount())
        .bind(body)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to save {} {}: {}", D::KIND, id, e);
            save_failed::<D>()
        })?;

        if result.rows_affected() == 0 {
            error!("Document {} exists with a different kind than {}", id, D::KIND);
            return Err(PersistError::new(format!(
                "Could not save the {}: the id belongs to another document.",
                D::KIND.label()
            )));
        }

        info!("Saved {} {} ({})", D::KIND, id, document.amount());
        Ok(())
    }
}
