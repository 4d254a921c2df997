//! Read-only lookup rows fetched from the accounting backend.
//!
//! The backend speaks OData, so rows arrive with PascalCase keys.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A row that can populate a dropdown.
pub trait OptionRow {
    fn id(&self) -> Uuid;
    fn label(&self) -> String;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Address {
    #[serde(default)]
    pub line1: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Customer {
    pub id: Uuid,
    pub display_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub billing_address: Option<Address>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Vendor {
    pub id: Uuid,
    pub display_name: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Account {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub account_number: Option<String>,
    pub account_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub sales_price: Option<Decimal>,
    #[serde(default)]
    pub purchase_cost: Option<Decimal>,
    #[serde(default = "default_taxable")]
    pub taxable: bool,
}

fn default_taxable() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Project {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Class {
    pub id: Uuid,
    pub name: String,
}

/// Sales tax rate; `rate` is a fraction (0.0825 for 8.25%).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TaxRate {
    pub id: Uuid,
    pub name: String,
    pub rate: Decimal,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// Per-mile reimbursement rate for a trip category, valid from `effective_date`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MileageRate {
    pub id: Uuid,
    pub category: String,
    pub effective_date: NaiveDate,
    pub rate_per_mile: Decimal,
}

impl OptionRow for Customer {
    fn id(&self) -> Uuid {
        self.id
    }
    fn label(&self) -> String {
        self.display_name.clone()
    }
}

impl OptionRow for Vendor {
    fn id(&self) -> Uuid {
        self.id
    }
    fn label(&self) -> String {
        self.display_name.clone()
    }
}

impl OptionRow for Account {
    fn id(&self) -> Uuid {
        self.id
    }
    fn label(&self) -> String {
        match &self.account_number {
            Some(number) => format!("{} {}", number, self.name),
            None => self.name.clone(),
        }
    }
}

impl OptionRow for Product {
    fn id(&self) -> Uuid {
        self.id
    }
    fn label(&self) -> String {
        self.name.clone()
    }
}

impl OptionRow for Project {
    fn id(&self) -> Uuid {
        self.id
    }
    fn label(&self) -> String {
        self.name.clone()
    }
}

impl OptionRow for Class {
    fn id(&self) -> Uuid {
        self.id
    }
    fn label(&self) -> String {
        self.name.clone()
    }
}

impl OptionRow for TaxRate {
    fn id(&self) -> Uuid {
        self.id
    }
    fn label(&self) -> String {
        format!("{} ({}%)", self.name, (self.rate * Decimal::ONE_HUNDRED).normalize())
    }
}

impl OptionRow for MileageRate {
    fn id(&self) -> Uuid {
        self.id
    }
    fn label(&self) -> String {
        format!("{} from {}: {}/mi", self.category, self.effective_date, self.rate_per_mile)
    }
}
