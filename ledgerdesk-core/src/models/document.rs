use std::fmt;

use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use uuid::Uuid;

use crate::form::field::Field;
use crate::form::lines::LineCollection;
use crate::form::schema::{LineRules, Schema};
use crate::form::totals::{compute_totals, Totals};
use crate::models::line::Line;

/// Transactional document types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Invoice,
    Estimate,
    Bill,
    PurchaseOrder,
    Expense,
    MileageTrip,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Invoice => "invoice",
            DocumentKind::Estimate => "estimate",
            DocumentKind::Bill => "bill",
            DocumentKind::PurchaseOrder => "purchase_order",
            DocumentKind::Expense => "expense",
            DocumentKind::MileageTrip => "mileage_trip",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DocumentKind::Invoice => "invoice",
            DocumentKind::Estimate => "estimate",
            DocumentKind::Bill => "bill",
            DocumentKind::PurchaseOrder => "purchase order",
            DocumentKind::Expense => "expense",
            DocumentKind::MileageTrip => "mileage trip",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

pub const INVOICE_STATUSES: &[&str] = &["draft", "sent", "paid", "overdue", "cancelled"];
pub const ESTIMATE_STATUSES: &[&str] =
    &["draft", "sent", "accepted", "declined", "expired", "converted"];
pub const BILL_STATUSES: &[&str] = &["open", "partial", "paid", "overdue"];
pub const PURCHASE_ORDER_STATUSES: &[&str] = &["draft", "open", "received", "closed", "cancelled"];
pub const PAYMENT_METHODS: &[&str] = &["cash", "check", "credit_card", "bank_transfer"];

/// Anything the submission gate can validate and hand to persistence.
pub trait Document: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const KIND: DocumentKind;

    fn id(&self) -> Option<Uuid>;

    fn set_id(&mut self, id: Uuid);

    /// Headline amount stored next to the document (total or deductible).
    fn amount(&self) -> Decimal;

    fn schema() -> Schema<Self>;

    fn validate(&self) -> Result<(), crate::form::schema::ValidationErrors> {
        Self::schema().validate(self)
    }
}

/// Header + lines documents sharing the line-item form.
pub trait LineDocument: Document {
    /// Whether sales tax applies to this kind at all.
    const CHARGES_TAX: bool;

    fn lines(&self) -> &[Line];

    fn set_lines(&mut self, lines: Vec<Line>);

    fn totals(&self) -> &Totals;

    fn set_totals(&mut self, totals: Totals);

    /// Selected tax rate entity, for kinds that charge tax.
    fn tax_rate_id(&self) -> Option<Uuid> {
        None
    }

    fn set_tax_rate_id(&mut self, _id: Option<Uuid>) {}

    /// Customer whose address drives the auto tax lookup.
    fn customer_id(&self) -> Option<Uuid> {
        None
    }

    /// New document with one blank line and date defaults relative to `today`.
    fn blank(today: NaiveDate) -> Self;

    fn line_rules() -> LineRules {
        LineRules::default()
    }
}

/// Rejects documents whose stored totals no longer follow from their lines.
fn totals_match<D: LineDocument>(doc: &D) -> Option<String> {
    let lines = LineCollection::from_lines(doc.lines().to_vec(), 0);
    let rate = if D::CHARGES_TAX {
        doc.totals().tax_rate
    } else {
        Decimal::ZERO
    };
    let expected = compute_totals(lines.lines(), lines.taxable_flags(), rate);
    if &expected == doc.totals() {
        None
    } else {
        Some(format!(
            "Totals are out of date (expected total {}, got {})",
            expected.total,
            doc.totals().total
        ))
    }
}

fn plus_days(date: NaiveDate, days: u64) -> NaiveDate {
    date.checked_add_days(Days::new(days)).unwrap_or(date)
}

fn draft() -> String {
    "draft".to_string()
}

fn open() -> String {
    "open".to_string()
}

/// Starting totals for a single blank line.
fn blank_totals() -> Totals {
    compute_totals(&[Line::blank()], &Default::default(), Decimal::ZERO)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(default)]
    pub invoice_number: String,
    #[serde(default)]
    pub customer_id: Field<Uuid>,
    #[serde(default)]
    pub issue_date: Field<NaiveDate>,
    #[serde(default)]
    pub due_date: Field<NaiveDate>,
    #[serde(default = "draft")]
    pub status: String,
    #[serde(default)]
    pub tax_rate_id: Field<Uuid>,
    #[serde(default)]
    pub notes: Option<String>,
    pub lines: Vec<Line>,
    #[serde(default)]
    pub totals: Totals,
}

impl Document for Invoice {
    const KIND: DocumentKind = DocumentKind::Invoice;

    fn id(&self) -> Option<Uuid> {
        self.id
    }

    fn set_id(&mut self, id: Uuid) {
        self.id = Some(id);
    }

    fn amount(&self) -> Decimal {
        self.totals.total
    }

    fn schema() -> Schema<Self> {
        Schema::builder("invoice")
            .required_text("invoice_number", "Invoice number is required", |d: &Invoice| {
                d.invoice_number.as_str()
            })
            .required("customer_id", "Customer is required", |d: &Invoice| {
                d.customer_id.is_present()
            })
            .required("issue_date", "Invoice date is required", |d: &Invoice| {
                d.issue_date.is_present()
            })
            .date_order(
                "due_date",
                "Due date must be on or after the invoice date",
                |d: &Invoice| d.issue_date.get(),
                |d: &Invoice| d.due_date.get(),
            )
            .one_of("status", |d: &Invoice| d.status.as_str(), INVOICE_STATUSES)
            .lines(|d: &Invoice| d.lines.as_slice(), Self::line_rules())
            .refine("totals", totals_match::<Invoice>)
            .build()
    }
}

impl LineDocument for Invoice {
    const CHARGES_TAX: bool = true;

    fn lines(&self) -> &[Line] {
        &self.lines
    }

    fn set_lines(&mut self, lines: Vec<Line>) {
        self.lines = lines;
    }

    fn totals(&self) -> &Totals {
        &self.totals
    }

    fn set_totals(&mut self, totals: Totals) {
        self.totals = totals;
    }

    fn tax_rate_id(&self) -> Option<Uuid> {
        self.tax_rate_id.get()
    }

    fn set_tax_rate_id(&mut self, id: Option<Uuid>) {
        self.tax_rate_id = Field::from_option(id);
    }

    fn customer_id(&self) -> Option<Uuid> {
        self.customer_id.get()
    }

    fn blank(today: NaiveDate) -> Self {
        Self {
            id: None,
            invoice_number: String::new(),
            customer_id: Field::Unset,
            issue_date: Field::Value(today),
            due_date: Field::Value(plus_days(today, 30)),
            status: draft(),
            tax_rate_id: Field::Unset,
            notes: None,
            lines: vec![Line::blank()],
            totals: blank_totals(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Estimate {
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(default)]
    pub estimate_number: String,
    #[serde(default)]
    pub customer_id: Field<Uuid>,
    #[serde(default)]
    pub issue_date: Field<NaiveDate>,
    #[serde(default)]
    pub expiration_date: Field<NaiveDate>,
    #[serde(default = "draft")]
    pub status: String,
    #[serde(default)]
    pub tax_rate_id: Field<Uuid>,
    #[serde(default)]
    pub notes: Option<String>,
    pub lines: Vec<Line>,
    #[serde(default)]
    pub totals: Totals,
}

impl Document for Estimate {
    const KIND: DocumentKind = DocumentKind::Estimate;

    fn id(&self) -> Option<Uuid> {
        self.id
    }

    fn set_id(&mut self, id: Uuid) {
        self.id = Some(id);
    }

    fn amount(&self) -> Decimal {
        self.totals.total
    }

    fn schema() -> Schema<Self> {
        Schema::builder("estimate")
            .required_text("estimate_number", "Estimate number is required", |d: &Estimate| {
                d.estimate_number.as_str()
            })
            .required("customer_id", "Customer is required", |d: &Estimate| {
                d.customer_id.is_present()
            })
            .required("issue_date", "Estimate date is required", |d: &Estimate| {
                d.issue_date.is_present()
            })
            .date_order(
                "expiration_date",
                "Expiration date must be on or after the estimate date",
                |d: &Estimate| d.issue_date.get(),
                |d: &Estimate| d.expiration_date.get(),
            )
            .one_of("status", |d: &Estimate| d.status.as_str(), ESTIMATE_STATUSES)
            .lines(|d: &Estimate| d.lines.as_slice(), Self::line_rules())
            .refine("totals", totals_match::<Estimate>)
            .build()
    }
}

impl LineDocument for Estimate {
    const CHARGES_TAX: bool = true;

    fn lines(&self) -> &[Line] {
        &self.lines
    }

    fn set_lines(&mut self, lines: Vec<Line>) {
        self.lines = lines;
    }

    fn totals(&self) -> &Totals {
        &self.totals
    }

    fn set_totals(&mut self, totals: Totals) {
        self.totals = totals;
    }

    fn tax_rate_id(&self) -> Option<Uuid> {
        self.tax_rate_id.get()
    }

    fn set_tax_rate_id(&mut self, id: Option<Uuid>) {
        self.tax_rate_id = Field::from_option(id);
    }

    fn customer_id(&self) -> Option<Uuid> {
        self.customer_id.get()
    }

    fn blank(today: NaiveDate) -> Self {
        Self {
            id: None,
            estimate_number: String::new(),
            customer_id: Field::Unset,
            issue_date: Field::Value(today),
            expiration_date: Field::Value(plus_days(today, 30)),
            status: draft(),
            tax_rate_id: Field::Unset,
            notes: None,
            lines: vec![Line::blank()],
            totals: blank_totals(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bill {
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(default)]
    pub bill_number: Option<String>,
    #[serde(default)]
    pub vendor_id: Field<Uuid>,
    #[serde(default)]
    pub bill_date: Field<NaiveDate>,
    #[serde(default)]
    pub due_date: Field<NaiveDate>,
    #[serde(default = "open")]
    pub status: String,
    #[serde(default)]
    pub notes: Option<String>,
    pub lines: Vec<Line>,
    #[serde(default)]
    pub totals: Totals,
}

impl Document for Bill {
    const KIND: DocumentKind = DocumentKind::Bill;

    fn id(&self) -> Option<Uuid> {
        self.id
    }

    fn set_id(&mut self, id: Uuid) {
        self.id = Some(id);
    }

    fn amount(&self) -> Decimal {
        self.totals.total
    }

    fn schema() -> Schema<Self> {
        Schema::builder("bill")
            .required("vendor_id", "Vendor is required", |d: &Bill| d.vendor_id.is_present())
            .required("bill_date", "Bill date is required", |d: &Bill| d.bill_date.is_present())
            .date_order(
                "due_date",
                "Due date must be on or after the bill date",
                |d: &Bill| d.bill_date.get(),
                |d: &Bill| d.due_date.get(),
            )
            .one_of("status", |d: &Bill| d.status.as_str(), BILL_STATUSES)
            .lines(|d: &Bill| d.lines.as_slice(), Self::line_rules())
            .refine("totals", totals_match::<Bill>)
            .build()
    }
}

impl LineDocument for Bill {
    const CHARGES_TAX: bool = false;

    fn lines(&self) -> &[Line] {
        &self.lines
    }

    fn set_lines(&mut self, lines: Vec<Line>) {
        self.lines = lines;
    }

    fn totals(&self) -> &Totals {
        &self.totals
    }

    fn set_totals(&mut self, totals: Totals) {
        self.totals = totals;
    }

    fn blank(today: NaiveDate) -> Self {
        Self {
            id: None,
            bill_number: None,
            vendor_id: Field::Unset,
            bill_date: Field::Value(today),
            due_date: Field::Value(plus_days(today, 30)),
            status: open(),
            notes: None,
            lines: vec![Line::blank()],
            totals: blank_totals(),
        }
    }

    fn line_rules() -> LineRules {
        LineRules {
            require_account: true,
            ..LineRules::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseOrder {
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(default)]
    pub po_number: String,
    #[serde(default)]
    pub vendor_id: Field<Uuid>,
    #[serde(default)]
    pub order_date: Field<NaiveDate>,
    #[serde(default)]
    pub expected_date: Field<NaiveDate>,
    #[serde(default = "draft")]
    pub status: String,
    #[serde(default)]
    pub notes: Option<String>,
    pub lines: Vec<Line>,
    #[serde(default)]
    pub totals: Totals,
}

impl Document for PurchaseOrder {
    const KIND: DocumentKind = DocumentKind::PurchaseOrder;

    fn id(&self) -> Option<Uuid> {
        self.id
    }

    fn set_id(&mut self, id: Uuid) {
        self.id = Some(id);
    }

    fn amount(&self) -> Decimal {
        self.totals.total
    }

    fn schema() -> Schema<Self> {
        Schema::builder("purchase_order")
            .required_text("po_number", "PO number is required", |d: &PurchaseOrder| {
                d.po_number.as_str()
            })
            .required("vendor_id", "Vendor is required", |d: &PurchaseOrder| {
                d.vendor_id.is_present()
            })
            .required("order_date", "Order date is required", |d: &PurchaseOrder| {
                d.order_date.is_present()
            })
            .date_order(
                "expected_date",
                "Expected date must be on or after the order date",
                |d: &PurchaseOrder| d.order_date.get(),
                |d: &PurchaseOrder| d.expected_date.get(),
            )
            .one_of(
                "status",
                |d: &PurchaseOrder| d.status.as_str(),
                PURCHASE_ORDER_STATUSES,
            )
            .lines(|d: &PurchaseOrder| d.lines.as_slice(), Self::line_rules())
            .refine("totals", totals_match::<PurchaseOrder>)
            .build()
    }
}

impl LineDocument for PurchaseOrder {
    const CHARGES_TAX: bool = false;

    fn lines(&self) -> &[Line] {
        &self.lines
    }

    fn set_lines(&mut self, lines: Vec<Line>) {
        self.lines = lines;
    }

    fn totals(&self) -> &Totals {
        &self.totals
    }

    fn set_totals(&mut self, totals: Totals) {
        self.totals = totals;
    }

    fn blank(today: NaiveDate) -> Self {
        Self {
            id: None,
            po_number: String::new(),
            vendor_id: Field::Unset,
            order_date: Field::Value(today),
            expected_date: Field::Value(plus_days(today, 14)),
            status: draft(),
            notes: None,
            lines: vec![Line::blank()],
            totals: blank_totals(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    #[serde(default)]
    pub id: Option<Uuid>,
    /// Vendor paid, if any
    #[serde(default)]
    pub payee_id: Field<Uuid>,
    /// Bank or card account the money left from
    #[serde(default)]
    pub payment_account_id: Field<Uuid>,
    #[serde(default)]
    pub expense_date: Field<NaiveDate>,
    #[serde(default = "default_payment_method")]
    pub payment_method: String,
    #[serde(default)]
    pub reference_number: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    pub lines: Vec<Line>,
    #[serde(default)]
    pub totals: Totals,
}

fn default_payment_method() -> String {
    "cash".to_string()
}

impl Document for Expense {
    const KIND: DocumentKind = DocumentKind::Expense;

    fn id(&self) -> Option<Uuid> {
        self.id
    }

    fn set_id(&mut self, id: Uuid) {
        self.id = Some(id);
    }

    fn amount(&self) -> Decimal {
        self.totals.total
    }

    fn schema() -> Schema<Self> {
        Schema::builder("expense")
            .required("payment_account_id", "Payment account is required", |d: &Expense| {
                d.payment_account_id.is_present()
            })
            .required("expense_date", "Expense date is required", |d: &Expense| {
                d.expense_date.is_present()
            })
            .one_of(
                "payment_method",
                |d: &Expense| d.payment_method.as_str(),
                PAYMENT_METHODS,
            )
            .lines(|d: &Expense| d.lines.as_slice(), Self::line_rules())
            .refine("totals", totals_match::<Expense>)
            .build()
    }
}

impl LineDocument for Expense {
    const CHARGES_TAX: bool = false;

    fn lines(&self) -> &[Line] {
        &self.lines
    }

    fn set_lines(&mut self, lines: Vec<Line>) {
        self.lines = lines;
    }

    fn totals(&self) -> &Totals {
        &self.totals
    }

    fn set_totals(&mut self, totals: Totals) {
        self.totals = totals;
    }

    fn blank(today: NaiveDate) -> Self {
        Self {
            id: None,
            payee_id: Field::Unset,
            payment_account_id: Field::Unset,
            expense_date: Field::Value(today),
            payment_method: default_payment_method(),
            reference_number: None,
            notes: None,
            lines: vec![Line::blank()],
            totals: blank_totals(),
        }
    }

    fn line_rules() -> LineRules {
        LineRules {
            require_account: true,
            ..LineRules::default()
        }
    }
}
