use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::debug;

use crate::error::SubmitError;
use crate::form::field::Field;
use crate::form::gate::{DocumentSink, SubmissionGate};
use crate::models::document::Document;
use crate::models::mileage::{resolve_mileage_rate, MileageTrip};
use crate::models::reference::MileageRate;

/// Editing session for a mileage trip.
///
/// Distance, round-trip, category and date changes re-resolve the per-mile
/// rate and recompute the deductible amount.
pub struct MileageForm {
    trip: MileageTrip,
    rates: Vec<MileageRate>,
}

impl MileageForm {
    pub fn new(today: NaiveDate, rates: Vec<MileageRate>) -> Self {
        Self::load(MileageTrip::blank(today), rates)
    }

    pub fn load(trip: MileageTrip, rates: Vec<MileageRate>) -> Self {
        let mut form = Self { trip, rates };
        form.recompute();
        form
    }

    pub fn trip(&self) -> &MileageTrip {
        &self.trip
    }

    pub fn deductible(&self) -> Decimal {
        self.trip.deductible_amount
    }

    pub fn set_distance(&mut self, distance: Field<Decimal>) {
        self.trip.distance = distance;
        self.recompute();
    }

    pub fn set_round_trip(&mut self, round_trip: bool) {
        self.trip.round_trip = round_trip;
        self.recompute();
    }

    pub fn set_category(&mut self, category: impl Into<String>) {
        self.trip.category = category.into();
        self.recompute();
    }

    pub fn set_trip_date(&mut self, date: Field<NaiveDate>) {
        self.trip.trip_date = date;
        self.recompute();
    }

    /// Replaces the rate table (e.g. once the reference fetch lands).
    pub fn set_rates(&mut self, rates: Vec<MileageRate>) {
        self.rates = rates;
        self.recompute();
    }

    /// Edits fields that do not feed the deductible.
    pub fn edit(&mut self, edit: impl FnOnce(&mut MileageTrip)) {
        edit(&mut self.trip);
        self.recompute();
    }

    pub fn snapshot(&self) -> MileageTrip {
        let mut trip = self.trip.clone();
        trip.deductible_amount = trip.compute_deductible();
        trip
    }

    pub async fn submit<S>(&mut self, gate: &SubmissionGate, sink: &S) -> Result<MileageTrip, SubmitError>
    where
        S: DocumentSink<MileageTrip> + ?Sized,
    {
        let trip = self.snapshot();
        gate.submit(&trip, sink).await?;
        Ok(trip)
    }

    fn recompute(&mut self) {
        if let Some(date) = self.trip.trip_date.get() {
            match resolve_mileage_rate(&self.rates, &self.trip.category, date) {
                Some(rate) => self.trip.rate_per_mile = Field::Value(rate.rate_per_mile),
                None if !self.rates.is_empty() => {
                    debug!(
                        "No {} mileage rate on or before {}",
                        self.trip.category, date
                    );
                    self.trip.rate_per_mile = Field::Cleared;
                }
                // Rates not loaded yet; keep whatever the trip carried.
                None => {}
            }
        }
        self.trip.deductible_amount = self.trip.compute_deductible();
        debug!("{} deductible: {}", MileageTrip::KIND, self.trip.deductible_amount);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn rates() -> Vec<MileageRate> {
        vec![
            MileageRate {
                id: Uuid::new_v4(),
                category: "business".to_string(),
                effective_date: date(2024, 1, 1),
                rate_per_mile: dec!(0.67),
            },
            MileageRate {
                id: Uuid::new_v4(),
                category: "medical".to_string(),
                effective_date: date(2024, 1, 1),
                rate_per_mile: dec!(0.21),
            },
        ]
    }

    #[test]
    fn test_round_trip_doubles_distance() {
        let mut form = MileageForm::new(date(2024, 6, 1), rates());
        form.set_distance(Field::Value(dec!(25.5)));
        assert_eq!(form.deductible(), dec!(17.09));
        form.set_round_trip(true);
        assert_eq!(form.deductible(), dec!(34.17));
    }

    #[test]
    fn test_category_change_reprices() {
        let mut form = MileageForm::new(date(2024, 6, 1), rates());
        form.set_distance(Field::Value(dec!(100)));
        form.set_category("medical");
        assert_eq!(form.trip().rate_per_mile, Field::Value(dec!(0.21)));
        assert_eq!(form.deductible(), dec!(21.00));
    }

    #[test]
    fn test_date_before_any_rate_clears_rate() {
        let mut form = MileageForm::new(date(2024, 6, 1), rates());
        form.set_distance(Field::Value(dec!(10)));
        form.set_trip_date(Field::Value(date(2023, 6, 1)));
        assert_eq!(form.trip().rate_per_mile, Field::Cleared);
        assert_eq!(form.deductible(), Decimal::ZERO);
    }

    #[test]
    fn test_snapshot_validates_once_filled() {
        let mut form = MileageForm::new(date(2024, 6, 1), rates());
        form.set_distance(Field::Value(dec!(12)));
        form.edit(|t| t.purpose = "Site visit".to_string());
        assert!(form.snapshot().validate().is_ok());
    }
}
