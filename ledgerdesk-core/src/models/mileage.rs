use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::form::field::Field;
use crate::form::schema::Schema;
use crate::form::totals::mileage_deductible;
use crate::models::document::{Document, DocumentKind};
use crate::models::reference::MileageRate;

pub const MILEAGE_CATEGORIES: &[&str] = &["business", "medical", "charity", "moving"];

/// A logged trip; its deductible amount is derived from distance and rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MileageTrip {
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(default)]
    pub trip_date: Field<NaiveDate>,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub vehicle_id: Field<Uuid>,
    #[serde(default)]
    pub customer_id: Field<Uuid>,
    #[serde(default)]
    pub start_location: Option<String>,
    #[serde(default)]
    pub end_location: Option<String>,
    /// One-way distance in miles
    #[serde(default)]
    pub distance: Field<Decimal>,
    #[serde(default)]
    pub round_trip: bool,
    #[serde(default)]
    pub purpose: String,
    #[serde(default)]
    pub rate_per_mile: Field<Decimal>,
    #[serde(default)]
    pub deductible_amount: Decimal,
}

fn default_category() -> String {
    "business".to_string()
}

impl MileageTrip {
    pub fn blank(today: NaiveDate) -> Self {
        Self {
            id: None,
            trip_date: Field::Value(today),
            category: default_category(),
            vehicle_id: Field::Unset,
            customer_id: Field::Unset,
            start_location: None,
            end_location: None,
            distance: Field::Unset,
            round_trip: false,
            purpose: String::new(),
            rate_per_mile: Field::Unset,
            deductible_amount: Decimal::ZERO,
        }
    }

    /// Deductible for the current inputs; missing inputs count as zero.
    pub fn compute_deductible(&self) -> Decimal {
        mileage_deductible(
            self.distance.get().unwrap_or(Decimal::ZERO),
            self.round_trip,
            self.rate_per_mile.get().unwrap_or(Decimal::ZERO),
        )
    }
}

impl Document for MileageTrip {
    const KIND: DocumentKind = DocumentKind::MileageTrip;

    fn id(&self) -> Option<Uuid> {
        self.id
    }

    fn set_id(&mut self, id: Uuid) {
        self.id = Some(id);
    }

    fn amount(&self) -> Decimal {
        self.deductible_amount
    }

    fn schema() -> Schema<Self> {
        Schema::builder("mileage_trip")
            .required("trip_date", "Trip date is required", |t: &MileageTrip| {
                t.trip_date.is_present()
            })
            .one_of("category", |t: &MileageTrip| t.category.as_str(), MILEAGE_CATEGORIES)
            .required("distance", "Distance is required", |t: &MileageTrip| {
                t.distance.is_present()
            })
            .min(
                "distance",
                "Distance must be greater than 0",
                |t: &MileageTrip| t.distance.get(),
                Decimal::ZERO,
                false,
            )
            .required_text("purpose", "Purpose is required", |t: &MileageTrip| {
                t.purpose.as_str()
            })
            .min(
                "rate_per_mile",
                "Rate per mile cannot be negative",
                |t: &MileageTrip| t.rate_per_mile.get(),
                Decimal::ZERO,
                true,
            )
            .refine("deductible_amount", |t: &MileageTrip| {
                let expected = t.compute_deductible();
                (expected != t.deductible_amount).then(|| {
                    format!(
                        "Deductible amount is out of date (expected {}, got {})",
                        expected, t.deductible_amount
                    )
                })
            })
            .build()
    }
}

/// Most recent rate for `category` that took effect on or before `on`.
pub fn resolve_mileage_rate<'a>(
    rates: &'a [MileageRate],
    category: &str,
    on: NaiveDate,
) -> Option<&'a MileageRate> {
    rates
        .iter()
        .filter(|r| r.category.eq_ignore_ascii_case(category) && r.effective_date <= on)
        .max_by_key(|r| r.effective_date)
}
