use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::error::TaxLookupError;
use crate::models::reference::{Address, Customer};

/// Rate returned by the tax auto-calculation endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoTaxRate {
    /// Fraction, e.g. 0.0825
    pub rate: Decimal,
    /// Human-readable origin of the rate (jurisdiction, data provider)
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaxQuery {
    pub postal_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
}

impl TaxQuery {
    /// Builds a query from an address; `None` without a postal code.
    pub fn for_address(address: &Address) -> Option<Self> {
        let postal_code = address.postal_code.as_deref()?.trim();
        if postal_code.is_empty() {
            return None;
        }
        Some(Self {
            postal_code: postal_code.to_string(),
            state: address.state.clone(),
            city: address.city.clone(),
        })
    }
}

#[async_trait]
pub trait TaxLookup: Send + Sync {
    async fn lookup(&self, query: &TaxQuery) -> Result<AutoTaxRate, TaxLookupError>;
}

/// Calls `GET {base}/tax/calculate` on the accounting backend.
pub struct HttpTaxLookup {
    client: Client,
    base_url: String,
}

impl HttpTaxLookup {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl TaxLookup for HttpTaxLookup {
    #[instrument(skip(self))]
    async fn lookup(&self, query: &TaxQuery) -> Result<AutoTaxRate, TaxLookupError> {
        let url = format!("{}/tax/calculate", self.base_url.trim_end_matches('/'));
        let response = self.client.get(&url).query(query).send().await?;

        if !response.status().is_success() {
            return Err(TaxLookupError::Status(response.status().as_u16()));
        }

        Ok(response.json::<AutoTaxRate>().await?)
    }
}

/// Auto tax rate for a customer, if one can be determined.
///
/// Customers without a postal code skip the lookup. Lookup failures are
/// logged and leave the manual rate in charge.
pub async fn auto_rate_for(lookup: &dyn TaxLookup, customer: &Customer) -> Option<AutoTaxRate> {
    let Some(query) = customer.billing_address.as_ref().and_then(TaxQuery::for_address) else {
        debug!("Customer {} has no postal code; skipping tax lookup", customer.id);
        return None;
    };

    match lookup.lookup(&query).await {
        Ok(rate) => {
            debug!(
                "Auto tax rate for {}: {} ({})",
                query.postal_code, rate.rate, rate.source
            );
            Some(rate)
        }
        Err(e) => {
            warn!("Tax lookup for {} failed: {}", query.postal_code, e);
            None
        }
    }
}
