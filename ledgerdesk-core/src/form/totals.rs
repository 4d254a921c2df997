use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::TaxPrecedence;
use crate::form::lines::IndexedMeta;
use crate::models::line::Line;
use crate::models::reference::TaxRate;
use crate::tax::AutoTaxRate;

/// Rounds a monetary value to cents, midpoints away from zero.
pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Derived document totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    pub subtotal: Decimal,
    pub taxable_subtotal: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    /// Rate the tax was computed with, as a fraction
    pub tax_rate: Decimal,
}

/// Computes totals from the lines, their taxability flags and the rate.
///
/// Lines missing from `taxable` are treated as taxable. Sums are taken over
/// exact decimal products and rounded once per output, so line order never
/// changes the result.
pub fn compute_totals(lines: &[Line], taxable: &IndexedMeta<bool>, rate: Decimal) -> Totals {
    let mut subtotal = Decimal::ZERO;
    let mut taxable_subtotal = Decimal::ZERO;

    for (i, line) in lines.iter().enumerate() {
        let amount = line.raw_amount();
        subtotal += amount;
        if taxable.get_or(i, true) {
            taxable_subtotal += amount;
        }
    }

    let subtotal = round2(subtotal);
    let taxable_subtotal = round2(taxable_subtotal);
    let tax = round2(taxable_subtotal * rate);

    Totals {
        subtotal,
        taxable_subtotal,
        tax,
        total: round2(subtotal + tax),
        tax_rate: rate,
    }
}

/// Where the applied tax rate came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RateSource {
    /// Looked up from the customer's address
    Auto { label: String },
    /// Tax rate picked in the form
    Manual { tax_rate_id: Uuid, name: String },
    /// Rate the document was last saved with, kept until a rate is picked
    Stored,
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveRate {
    pub rate: Decimal,
    pub source: RateSource,
}

impl EffectiveRate {
    pub fn zero() -> Self {
        Self {
            rate: Decimal::ZERO,
            source: RateSource::None,
        }
    }

    pub fn stored(rate: Decimal) -> Self {
        Self {
            rate,
            source: RateSource::Stored,
        }
    }

    /// Picks the rate applied to the taxable subtotal.
    ///
    /// With [`TaxPrecedence::Auto`] an auto-calculated rate overrides the
    /// manual selection; with [`TaxPrecedence::Manual`] the selection wins and
    /// the auto rate only fills in when nothing is selected.
    pub fn resolve(
        auto: Option<&AutoTaxRate>,
        manual: Option<&TaxRate>,
        precedence: TaxPrecedence,
    ) -> Self {
        let from_auto = auto.map(|a| EffectiveRate {
            rate: a.rate,
            source: RateSource::Auto {
                label: a.source.clone(),
            },
        });
        let from_manual = manual.map(|m| EffectiveRate {
            rate: m.rate,
            source: RateSource::Manual {
                tax_rate_id: m.id,
                name: m.name.clone(),
            },
        });

        let picked = match precedence {
            TaxPrecedence::Auto => from_auto.or(from_manual),
            TaxPrecedence::Manual => from_manual.or(from_auto),
        };
        picked.unwrap_or_else(Self::zero)
    }
}

/// Deductible mileage amount; a round trip doubles the one-way distance.
pub fn mileage_deductible(distance: Decimal, round_trip: bool, rate_per_mile: Decimal) -> Decimal {
    let miles = if round_trip {
        distance * Decimal::TWO
    } else {
        distance
    };
    round2(miles * rate_per_mile)
}
