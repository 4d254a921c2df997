//! Global search over lists already loaded from the backend.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::debug;
use uuid::Uuid;

use crate::models::document::{Bill, Estimate, Invoice};
use crate::models::reference::{Customer, Product, Vendor};

/// Queries shorter than this return nothing.
pub const MIN_QUERY_LEN: usize = 2;

/// Result groups are listed in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Customer,
    Vendor,
    Invoice,
    Estimate,
    Bill,
    Product,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchRecord {
    pub kind: EntityKind,
    pub id: Uuid,
    pub title: String,
    pub subtitle: Option<String>,
    #[serde(skip)]
    pub keywords: Vec<String>,
}

impl SearchRecord {
    pub fn customer(customer: &Customer) -> Self {
        Self {
            kind: EntityKind::Customer,
            id: customer.id,
            title: customer.display_name.clone(),
            subtitle: customer.email.clone(),
            keywords: Vec::new(),
        }
    }

    pub fn vendor(vendor: &Vendor) -> Self {
        Self {
            kind: EntityKind::Vendor,
            id: vendor.id,
            title: vendor.display_name.clone(),
            subtitle: vendor.email.clone(),
            keywords: Vec::new(),
        }
    }

    pub fn product(product: &Product) -> Self {
        Self {
            kind: EntityKind::Product,
            id: product.id,
            title: product.name.clone(),
            subtitle: product.description.clone(),
            keywords: Vec::new(),
        }
    }

    /// Unsaved documents have no id and are not searchable.
    pub fn invoice(invoice: &Invoice) -> Option<Self> {
        Some(Self {
            kind: EntityKind::Invoice,
            id: invoice.id?,
            title: format!("Invoice {}", invoice.invoice_number),
            subtitle: Some(format!("{} · {}", invoice.status, invoice.totals.total)),
            keywords: vec![invoice.invoice_number.clone()],
        })
    }

    pub fn estimate(estimate: &Estimate) -> Option<Self> {
        Some(Self {
            kind: EntityKind::Estimate,
            id: estimate.id?,
            title: format!("Estimate {}", estimate.estimate_number),
            subtitle: Some(format!("{} · {}", estimate.status, estimate.totals.total)),
            keywords: vec![estimate.estimate_number.clone()],
        })
    }

    pub fn bill(bill: &Bill) -> Option<Self> {
        let number = bill.bill_number.clone().unwrap_or_default();
        Some(Self {
            kind: EntityKind::Bill,
            id: bill.id?,
            title: format!("Bill {}", number).trim_end().to_string(),
            subtitle: Some(format!("{} · {}", bill.status, bill.totals.total)),
            keywords: vec![number],
        })
    }

    fn matches(&self, needle: &str) -> bool {
        self.title.to_lowercase().contains(needle)
            || self
                .subtitle
                .as_deref()
                .is_some_and(|s| s.to_lowercase().contains(needle))
            || self.keywords.iter().any(|k| k.to_lowercase().contains(needle))
    }

    fn title_starts_with(&self, needle: &str) -> bool {
        self.title.to_lowercase().starts_with(needle)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchGroup {
    pub kind: EntityKind,
    pub results: Vec<SearchRecord>,
}

#[derive(Debug, Clone, Default)]
pub struct SearchIndex {
    records: Vec<SearchRecord>,
}

impl SearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, records: impl IntoIterator<Item = SearchRecord>) {
        self.records.extend(records);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Case-insensitive search, grouped by kind, at most `limit_per_kind`
    /// hits per group. Title prefix matches come first within a group.
    pub fn search(&self, query: &str, limit_per_kind: usize) -> Vec<SearchGroup> {
        let needle = query.trim().to_lowercase();
        if needle.chars().count() < MIN_QUERY_LEN {
            return Vec::new();
        }

        let mut hits: Vec<(EntityKind, bool, usize)> = self
            .records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.matches(&needle))
            .map(|(i, r)| (r.kind, !r.title_starts_with(&needle), i))
            .collect();
        hits.sort();

        let mut grouped: BTreeMap<EntityKind, Vec<SearchRecord>> = BTreeMap::new();
        for (kind, _, i) in hits {
            let results = grouped.entry(kind).or_default();
            if results.len() < limit_per_kind {
                results.push(self.records[i].clone());
            }
        }
        grouped
            .into_iter()
            .filter(|(_, results)| !results.is_empty())
            .map(|(kind, results)| SearchGroup { kind, results })
            .collect()
    }
}

/// Runs searches in the background once the query has been stable for
/// the debounce delay. Only the latest query is searched.
pub struct DebouncedSearch {
    query_tx: watch::Sender<String>,
    results_rx: watch::Receiver<Vec<SearchGroup>>,
    task: JoinHandle<()>,
}

impl DebouncedSearch {
    pub fn spawn(index: Arc<SearchIndex>, delay: Duration, limit_per_kind: usize) -> Self {
        let (query_tx, mut query_rx) = watch::channel(String::new());
        let (results_tx, results_rx) = watch::channel(Vec::new());

        let task = tokio::spawn(async move {
            loop {
                if query_rx.changed().await.is_err() {
                    return;
                }
                // Restart the wait on every keystroke.
                loop {
                    match timeout(delay, query_rx.changed()).await {
                        Ok(Ok(())) => continue,
                        Ok(Err(_)) => return,
                        Err(_) => break,
                    }
                }
                let query = query_rx.borrow_and_update().clone();
                let results = index.search(&query, limit_per_kind);
                debug!("Search {:?}: {} group(s)", query, results.len());
                if results_tx.send(results).is_err() {
                    return;
                }
            }
        });

        Self {
            query_tx,
            results_rx,
            task,
        }
    }

    pub fn set_query(&self, query: impl Into<String>) {
        self.query_tx.send_replace(query.into());
    }

    /// Latest published results.
    pub fn results(&self) -> Vec<SearchGroup> {
        self.results_rx.borrow().clone()
    }

    pub fn has_new_results(&self) -> bool {
        self.results_rx.has_changed().unwrap_or(false)
    }

    /// Waits for the next published results; false once the task is gone.
    pub async fn changed(&mut self) -> bool {
        let changed = self.results_rx.changed().await.is_ok();
        self.results_rx.borrow_and_update();
        changed
    }
}

impl Drop for DebouncedSearch {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(kind: EntityKind, title: &str, subtitle: Option<&str>) -> SearchRecord {
        SearchRecord {
            kind,
            id: Uuid::new_v4(),
            title: title.to_string(),
            subtitle: subtitle.map(str::to_string),
            keywords: Vec::new(),
        }
    }

    fn index() -> SearchIndex {
        let mut index = SearchIndex::new();
        index.extend([
            record(EntityKind::Vendor, "Acorn Supplies", None),
            record(EntityKind::Customer, "Big Acme Holdings", None),
            record(EntityKind::Customer, "Acme Corp", Some("billing@acme.test")),
            record(EntityKind::Customer, "Zenith", Some("ops@acme.test")),
            record(EntityKind::Product, "Consulting", Some("Hourly work for Acme")),
        ]);
        index
    }

    fn titles(group: &SearchGroup) -> Vec<&str> {
        group.results.iter().map(|r| r.title.as_str()).collect()
    }

    #[test]
    fn test_short_queries_return_nothing() {
        assert!(index().search("a", 5).is_empty());
        assert!(index().search("  a ", 5).is_empty());
    }

    #[test]
    fn test_results_grouped_with_prefix_matches_first() {
        let groups = index().search("ACME", 5);
        let kinds: Vec<EntityKind> = groups.iter().map(|g| g.kind).collect();
        assert_eq!(kinds, vec![EntityKind::Customer, EntityKind::Product]);
        assert_eq!(titles(&groups[0]), vec!["Acme Corp", "Big Acme Holdings", "Zenith"]);
    }

    #[test]
    fn test_limit_applies_per_kind() {
        let groups = index().search("ac", 1);
        assert_eq!(groups.len(), 3);
        assert!(groups.iter().all(|g| g.results.len() == 1));
        assert_eq!(titles(&groups[0]), vec!["Acme Corp"]);
    }

    #[test]
    fn test_unsaved_documents_are_not_indexed() {
        let today = chrono::NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();
        let mut invoice = <Invoice as crate::models::document::LineDocument>::blank(today);
        invoice.invoice_number = "INV-7".to_string();
        assert!(SearchRecord::invoice(&invoice).is_none());

        invoice.id = Some(Uuid::new_v4());
        let record = SearchRecord::invoice(&invoice).unwrap();
        assert_eq!(record.title, "Invoice INV-7");
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_searches_latest_query_only() {
        let mut search = DebouncedSearch::spawn(Arc::new(index()), Duration::from_millis(300), 5);

        search.set_query("ac");
        tokio::time::advance(Duration::from_millis(100)).await;
        search.set_query("acm");
        tokio::time::advance(Duration::from_millis(299)).await;
        assert!(!search.has_new_results(), "still inside the debounce window");

        assert!(search.changed().await);
        let groups = search.results();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].kind, EntityKind::Customer);
        assert!(groups.iter().all(|g| g.kind != EntityKind::Vendor));
    }
}
