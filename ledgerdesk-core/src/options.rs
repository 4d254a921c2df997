//! Dropdown option lists backed by the accounting backend's reference
//! resources.
//!
//! Each list is fetched at most once per form and cached for the form's
//! lifetime. A failed fetch is logged and leaves the list empty; the form
//! stays usable.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::error::SourceError;
use crate::models::reference::{
    Account, Class, Customer, MileageRate, OptionRow, Product, Project, TaxRate, Vendor,
};

/// Key of the row collection in a list response.
pub const ENVELOPE_KEY: &str = "value";

/// Label of the leading empty choice in every dropdown.
pub const NONE_SELECTED: &str = "None selected";

/// OData-style list parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub filter: Option<String>,
    pub order_by: Option<String>,
    pub top: Option<u32>,
}

impl ListQuery {
    pub fn ordered(order_by: &str) -> Self {
        Self {
            order_by: Some(order_by.to_string()),
            ..Self::default()
        }
    }

    pub fn with_filter(mut self, filter: &str) -> Self {
        self.filter = Some(filter.to_string());
        self
    }

    /// Query-string pairs; unset parameters are left out.
    pub fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(filter) = &self.filter {
            params.push(("$filter", filter.clone()));
        }
        if let Some(order_by) = &self.order_by {
            params.push(("$orderby", order_by.clone()));
        }
        if let Some(top) = self.top {
            params.push(("$top", top.to_string()));
        }
        params
    }
}

#[async_trait]
pub trait ReferenceSource: Send + Sync {
    /// Raw rows of `resource`, unwrapped from the response envelope.
    async fn fetch_rows(&self, resource: &str, query: &ListQuery) -> Result<Vec<Value>, SourceError>;
}

/// Reads `GET {base}/{resource}` and unwraps the `value` collection.
pub struct HttpReferenceSource {
    client: Client,
    base_url: String,
}

impl HttpReferenceSource {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl ReferenceSource for HttpReferenceSource {
    #[instrument(skip(self))]
    async fn fetch_rows(&self, resource: &str, query: &ListQuery) -> Result<Vec<Value>, SourceError> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), resource);
        let http = |source| SourceError::Http {
            resource: resource.to_string(),
            source,
        };

        let response = self
            .client
            .get(&url)
            .query(&query.params())
            .send()
            .await
            .map_err(http)?;

        if !response.status().is_success() {
            return Err(SourceError::Status {
                resource: resource.to_string(),
                status: response.status().as_u16(),
            });
        }

        let mut body: Value = response.json().await.map_err(http)?;
        match body.get_mut(ENVELOPE_KEY).map(Value::take) {
            Some(Value::Array(rows)) => Ok(rows),
            _ => Err(SourceError::Envelope {
                resource: resource.to_string(),
                key: ENVELOPE_KEY.to_string(),
            }),
        }
    }
}

/// One dropdown entry. `value` is `None` for the empty choice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectOption {
    pub value: Option<Uuid>,
    pub label: String,
}

/// Decodes rows, skipping the ones that do not fit `T`.
fn decode_rows<T: DeserializeOwned>(resource: &str, rows: Vec<Value>) -> Vec<T> {
    rows.into_iter()
        .filter_map(|row| match serde_json::from_value::<T>(row) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                warn!("Skipping malformed {} row: {}", resource, e);
                None
            }
        })
        .collect()
}

async fn fetch_decoded<T: DeserializeOwned>(
    source: &dyn ReferenceSource,
    resource: &str,
    query: &ListQuery,
) -> Vec<T> {
    match source.fetch_rows(resource, query).await {
        Ok(rows) => {
            let decoded = decode_rows(resource, rows);
            debug!("Loaded {} {} option(s)", decoded.len(), resource);
            decoded
        }
        Err(e) => {
            warn!("Failed to load {}: {}", resource, e);
            Vec::new()
        }
    }
}

/// A cached option list for one reference resource.
pub struct OptionSource<T> {
    resource: &'static str,
    query: ListQuery,
    rows: OnceCell<Vec<T>>,
}

impl<T> OptionSource<T>
where
    T: OptionRow + DeserializeOwned + Send + Sync,
{
    pub fn new(resource: &'static str, query: ListQuery) -> Self {
        Self {
            resource,
            query,
            rows: OnceCell::new(),
        }
    }

    pub fn resource(&self) -> &'static str {
        self.resource
    }

    pub fn query(&self) -> &ListQuery {
        &self.query
    }

    /// Fetches on first call; later calls return the cached rows.
    pub async fn load(&self, source: &dyn ReferenceSource) -> &[T] {
        self.rows
            .get_or_init(|| fetch_decoded(source, self.resource, &self.query))
            .await
    }

    /// Stores rows fetched elsewhere. Returns false if the list was
    /// already loaded.
    pub fn fill(&self, rows: Vec<T>) -> bool {
        self.rows.set(rows).is_ok()
    }

    pub fn is_loaded(&self) -> bool {
        self.rows.initialized()
    }

    /// Loaded rows, empty until the fetch lands.
    pub fn rows(&self) -> &[T] {
        self.rows.get().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn find(&self, id: Uuid) -> Option<&T> {
        self.rows().iter().find(|row| row.id() == id)
    }

    pub fn select_options(&self) -> Vec<SelectOption> {
        let mut options = Vec::with_capacity(self.rows().len() + 1);
        options.push(SelectOption {
            value: None,
            label: NONE_SELECTED.to_string(),
        });
        options.extend(self.rows().iter().map(|row| SelectOption {
            value: Some(row.id()),
            label: row.label(),
        }));
        options
    }

    pub fn label_for(&self, id: Uuid) -> Option<String> {
        self.find(id).map(OptionRow::label)
    }
}

/// All reference lists a document form may need.
pub struct ReferenceOptions {
    pub customers: OptionSource<Customer>,
    pub vendors: OptionSource<Vendor>,
    pub accounts: OptionSource<Account>,
    pub products: OptionSource<Product>,
    pub projects: OptionSource<Project>,
    pub classes: OptionSource<Class>,
    pub tax_rates: OptionSource<TaxRate>,
    pub mileage_rates: OptionSource<MileageRate>,
}

impl Default for ReferenceOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl ReferenceOptions {
    pub fn new() -> Self {
        Self {
            customers: OptionSource::new("customers", ListQuery::ordered("DisplayName")),
            vendors: OptionSource::new("vendors", ListQuery::ordered("DisplayName")),
            accounts: OptionSource::new("accounts", ListQuery::ordered("AccountNumber")),
            products: OptionSource::new("products", ListQuery::ordered("Name")),
            projects: OptionSource::new(
                "projects",
                ListQuery::ordered("Name").with_filter("Status eq 'active'"),
            ),
            classes: OptionSource::new("classes", ListQuery::ordered("Name")),
            tax_rates: OptionSource::new(
                "tax-rates",
                ListQuery::ordered("Name").with_filter("Active eq true"),
            ),
            mileage_rates: OptionSource::new(
                "mileage-rates",
                ListQuery::ordered("EffectiveDate desc"),
            ),
        }
    }

    /// Starts every fetch concurrently.
    ///
    /// Tasks only hold a weak reference to the options; a result that
    /// lands after the owner dropped them is discarded.
    pub fn prefetch(self: &Arc<Self>, source: Arc<dyn ReferenceSource>) -> Vec<JoinHandle<()>> {
        vec![
            spawn_fill(self, &source, |o| &o.customers),
            spawn_fill(self, &source, |o| &o.vendors),
            spawn_fill(self, &source, |o| &o.accounts),
            spawn_fill(self, &source, |o| &o.products),
            spawn_fill(self, &source, |o| &o.projects),
            spawn_fill(self, &source, |o| &o.classes),
            spawn_fill(self, &source, |o| &o.tax_rates),
            spawn_fill(self, &source, |o| &o.mileage_rates),
        ]
    }
}

fn spawn_fill<T>(
    options: &Arc<ReferenceOptions>,
    source: &Arc<dyn ReferenceSource>,
    pick: fn(&ReferenceOptions) -> &OptionSource<T>,
) -> JoinHandle<()>
where
    T: OptionRow + DeserializeOwned + Send + Sync + 'static,
{
    let target = pick(options);
    let resource = target.resource();
    let query = target.query().clone();
    let weak: Weak<ReferenceOptions> = Arc::downgrade(options);
    let source = Arc::clone(source);

    tokio::spawn(async move {
        let rows = fetch_decoded::<T>(source.as_ref(), resource, &query).await;
        match weak.upgrade() {
            Some(options) => {
                if !pick(&options).fill(rows) {
                    debug!("{} already loaded; dropping prefetched rows", resource);
                }
            }
            None => debug!("Form closed before {} arrived; discarding", resource),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::Notify;

    #[derive(Default)]
    struct MockSource {
        rows: HashMap<&'static str, Vec<Value>>,
        failing: Vec<&'static str>,
        calls: AtomicUsize,
        queries: Mutex<Vec<(String, ListQuery)>>,
        gate: Option<Arc<Notify>>,
    }

    #[async_trait]
    impl ReferenceSource for MockSource {
        async fn fetch_rows(&self, resource: &str, query: &ListQuery) -> Result<Vec<Value>, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.queries.lock().unwrap().push((resource.to_string(), query.clone()));
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if self.failing.contains(&resource) {
                return Err(SourceError::Status {
                    resource: resource.to_string(),
                    status: 500,
                });
            }
            Ok(self.rows.get(resource).cloned().unwrap_or_default())
        }
    }

    fn tax_rate_rows() -> Vec<Value> {
        vec![
            json!({ "Id": "00000000-0000-0000-0000-000000000001", "Name": "State", "Rate": "0.0625" }),
            json!({ "Id": "not-a-uuid", "Name": "Broken", "Rate": "0.01" }),
            json!({ "Id": "00000000-0000-0000-0000-000000000002", "Name": "City", "Rate": "0.02" }),
        ]
    }

    #[test]
    fn test_query_params_use_odata_names() {
        let query = ListQuery {
            filter: Some("Active eq true".to_string()),
            order_by: Some("Name".to_string()),
            top: Some(50),
        };
        assert_eq!(
            query.params(),
            vec![
                ("$filter", "Active eq true".to_string()),
                ("$orderby", "Name".to_string()),
                ("$top", "50".to_string()),
            ]
        );
        assert!(ListQuery::default().params().is_empty());
    }

    #[tokio::test]
    async fn test_load_fetches_once_and_skips_bad_rows() {
        let source = MockSource {
            rows: HashMap::from([("tax-rates", tax_rate_rows())]),
            ..MockSource::default()
        };
        let options = ReferenceOptions::new();

        let rows = options.tax_rates.load(&source).await;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].rate, dec!(0.0625));

        options.tax_rates.load(&source).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        let (resource, query) = source.queries.lock().unwrap()[0].clone();
        assert_eq!(resource, "tax-rates");
        assert_eq!(query.filter.as_deref(), Some("Active eq true"));
    }

    #[tokio::test]
    async fn test_failed_fetch_degrades_to_empty_list() {
        let source = MockSource {
            failing: vec!["customers"],
            ..MockSource::default()
        };
        let options = ReferenceOptions::new();

        assert!(options.customers.load(&source).await.is_empty());
        assert!(options.customers.is_loaded());
        assert_eq!(
            options.customers.select_options(),
            vec![SelectOption {
                value: None,
                label: NONE_SELECTED.to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_select_options_lead_with_none_and_resolve_labels() {
        let source = MockSource {
            rows: HashMap::from([("tax-rates", tax_rate_rows())]),
            ..MockSource::default()
        };
        let options = ReferenceOptions::new();
        options.tax_rates.load(&source).await;

        let select = options.tax_rates.select_options();
        assert_eq!(select.len(), 3);
        assert_eq!(select[0].value, None);
        assert_eq!(select[1].label, "State (6.25%)");

        let city = Uuid::from_u128(2);
        assert_eq!(options.tax_rates.label_for(city).as_deref(), Some("City (2%)"));
        assert_eq!(options.tax_rates.label_for(Uuid::from_u128(9)), None);
    }

    #[tokio::test]
    async fn test_prefetch_fills_every_list() {
        let source = Arc::new(MockSource {
            rows: HashMap::from([
                ("tax-rates", tax_rate_rows()),
                (
                    "customers",
                    vec![json!({ "Id": "00000000-0000-0000-0000-00000000000a", "DisplayName": "Acme" })],
                ),
            ]),
            failing: vec!["products"],
            ..MockSource::default()
        });
        let options = Arc::new(ReferenceOptions::new());

        for handle in options.prefetch(source.clone()) {
            handle.await.unwrap();
        }

        assert_eq!(source.calls.load(Ordering::SeqCst), 8);
        assert_eq!(options.customers.rows().len(), 1);
        assert_eq!(options.tax_rates.rows().len(), 2);
        assert!(options.products.is_loaded());
        assert!(options.products.rows().is_empty());
    }

    #[tokio::test]
    async fn test_results_after_teardown_are_discarded() {
        let gate = Arc::new(Notify::new());
        let source = Arc::new(MockSource {
            rows: HashMap::from([("tax-rates", tax_rate_rows())]),
            gate: Some(gate.clone()),
            ..MockSource::default()
        });
        let options = Arc::new(ReferenceOptions::new());
        let weak = Arc::downgrade(&options);

        let handles = options.prefetch(source.clone());
        drop(options);
        assert!(weak.upgrade().is_none(), "tasks must not keep the form alive");

        // Release the fetches one by one until every task has finished.
        for handle in handles {
            while !handle.is_finished() {
                gate.notify_one();
                tokio::task::yield_now().await;
            }
            handle.await.unwrap();
        }
        assert!(weak.upgrade().is_none());
    }
}
