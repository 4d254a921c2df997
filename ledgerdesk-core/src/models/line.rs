use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::form::field::Field;
use crate::form::totals::round2;

/// One row of a transactional document.
///
/// The amount is never stored; it is always `quantity * unit_price`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Line {
    #[serde(default)]
    pub description: Option<String>,

    /// Product or service sold/bought on this line
    #[serde(default)]
    pub product_id: Field<Uuid>,

    /// Income/expense account (bills and expenses)
    #[serde(default)]
    pub account_id: Field<Uuid>,

    #[serde(default)]
    pub quantity: Field<Decimal>,

    #[serde(default)]
    pub unit_price: Field<Decimal>,

    /// Taxability as persisted; the form keeps the live flag per index
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub taxable: Option<bool>,

    #[serde(default)]
    pub project_id: Field<Uuid>,

    #[serde(default)]
    pub class_id: Field<Uuid>,
}

impl Line {
    pub fn new(quantity: Decimal, unit_price: Decimal) -> Self {
        Self {
            description: None,
            product_id: Field::Unset,
            account_id: Field::Unset,
            quantity: Field::Value(quantity),
            unit_price: Field::Value(unit_price),
            taxable: None,
            project_id: Field::Unset,
            class_id: Field::Unset,
        }
    }

    /// Default row appended by "add line": quantity 1, price 0.
    pub fn blank() -> Self {
        Self::new(Decimal::ONE, Decimal::ZERO)
    }

    /// Unrounded `quantity * unit_price`; blank inputs count as zero.
    pub fn raw_amount(&self) -> Decimal {
        let quantity = self.quantity.get().unwrap_or(Decimal::ZERO);
        let price = self.unit_price.get().unwrap_or(Decimal::ZERO);
        quantity * price
    }

    /// Display amount, rounded to cents.
    pub fn amount(&self) -> Decimal {
        round2(self.raw_amount())
    }
}

/// Single-field edit applied to a line.
#[derive(Debug, Clone, PartialEq)]
pub enum LineEdit {
    Description(Option<String>),
    Product(Field<Uuid>),
    Account(Field<Uuid>),
    Quantity(Field<Decimal>),
    UnitPrice(Field<Decimal>),
    Project(Field<Uuid>),
    Class(Field<Uuid>),
}

impl LineEdit {
    pub fn apply(self, line: &mut Line) {
        match self {
            LineEdit::Description(v) => line.description = v,
            LineEdit::Product(v) => line.product_id = v,
            LineEdit::Account(v) => line.account_id = v,
            LineEdit::Quantity(v) => line.quantity = v,
            LineEdit::UnitPrice(v) => line.unit_price = v,
            LineEdit::Project(v) => line.project_id = v,
            LineEdit::Class(v) => line.class_id = v,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_amount_is_quantity_times_price() {
        assert_eq!(Line::new(dec!(2), dec!(10.00)).amount(), dec!(20.00));
        assert_eq!(Line::new(dec!(3), dec!(0.335)).amount(), dec!(1.01));
    }

    #[test]
    fn test_blank_inputs_count_as_zero() {
        let mut line = Line::blank();
        line.unit_price = Field::Cleared;
        assert_eq!(line.amount(), Decimal::ZERO);
    }

    #[test]
    fn test_edit_recomputes_amount() {
        let mut line = Line::blank();
        LineEdit::UnitPrice(Field::Value(dec!(12.5))).apply(&mut line);
        LineEdit::Quantity(Field::Value(dec!(4))).apply(&mut line);
        assert_eq!(line.amount(), dec!(50.00));
    }
}
