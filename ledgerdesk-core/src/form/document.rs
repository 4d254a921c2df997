use std::collections::BTreeSet;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::debug;
use uuid::Uuid;

use crate::config::TaxPrecedence;
use crate::error::{LineError, SubmitError};
use crate::form::field::Field;
use crate::form::gate::{DocumentSink, SubmissionGate};
use crate::form::lines::LineCollection;
use crate::form::schema::{Schema, ValidationErrors};
use crate::form::totals::{compute_totals, EffectiveRate, Totals};
use crate::models::document::LineDocument;
use crate::models::line::{Line, LineEdit};
use crate::models::reference::{Product, TaxRate};
use crate::tax::AutoTaxRate;

/// Editing session for one line-item document.
///
/// Holds the header, the line collection and the tax-rate inputs. Every
/// mutating call recomputes the totals before returning, so the totals read
/// back always belong to the current lines.
pub struct DocumentForm<D: LineDocument> {
    document: D,
    lines: LineCollection,
    manual_rate: Option<TaxRate>,
    auto_rate: Option<AutoTaxRate>,
    /// Saved rate; dropped by the first explicit rate choice
    stored_rate: Option<Decimal>,
    precedence: TaxPrecedence,
    totals: Totals,
    schema: Schema<D>,
    touched: BTreeSet<String>,
    errors: ValidationErrors,
}

impl<D: LineDocument> DocumentForm<D> {
    /// Empty document with one blank line and today's date defaults.
    pub fn new(today: NaiveDate, precedence: TaxPrecedence) -> Self {
        Self::load(D::blank(today), precedence)
    }

    /// Opens an existing document for editing.
    ///
    /// The saved tax rate keeps applying until the caller selects a rate
    /// (or clears it) or supplies a fresh lookup. It never competes with
    /// either under [`TaxPrecedence`].
    pub fn load(document: D, precedence: TaxPrecedence) -> Self {
        let min_lines = D::line_rules().min_lines;
        let lines = LineCollection::from_lines(document.lines().to_vec(), min_lines);
        let saved = document.totals().tax_rate;
        let stored_rate = (D::CHARGES_TAX && saved != Decimal::ZERO).then_some(saved);

        let mut form = Self {
            document,
            lines,
            manual_rate: None,
            auto_rate: None,
            stored_rate,
            precedence,
            totals: Totals::default(),
            schema: D::schema(),
            touched: BTreeSet::new(),
            errors: ValidationErrors::new(),
        };
        form.recompute();
        form
    }

    pub fn document(&self) -> &D {
        &self.document
    }

    pub fn lines(&self) -> &LineCollection {
        &self.lines
    }

    pub fn totals(&self) -> &Totals {
        &self.totals
    }

    pub fn errors(&self) -> &ValidationErrors {
        &self.errors
    }

    pub fn effective_rate(&self) -> EffectiveRate {
        if !D::CHARGES_TAX {
            return EffectiveRate::zero();
        }
        if let Some(rate) = self.stored_rate {
            return EffectiveRate::stored(rate);
        }
        EffectiveRate::resolve(self.auto_rate.as_ref(), self.manual_rate.as_ref(), self.precedence)
    }

    /// Edits header fields.
    pub fn edit_header(&mut self, edit: impl FnOnce(&mut D)) {
        edit(&mut self.document);
        self.recompute();
    }

    pub fn append_line(&mut self, line: Line) -> usize {
        let index = self.lines.append(line);
        self.recompute();
        index
    }

    pub fn remove_line(&mut self, index: usize) -> Result<Line, LineError> {
        let line = self.lines.remove(index)?;
        self.forget_line_paths();
        self.recompute();
        Ok(line)
    }

    pub fn update_line(&mut self, index: usize, edit: LineEdit) -> Result<(), LineError> {
        self.lines.update(index, edit)?;
        self.recompute();
        Ok(())
    }

    pub fn move_line(&mut self, from: usize, to: usize) -> Result<(), LineError> {
        self.lines.move_line(from, to)?;
        self.forget_line_paths();
        self.recompute();
        Ok(())
    }

    pub fn set_line_taxable(&mut self, index: usize, taxable: bool) -> Result<(), LineError> {
        self.lines.set_taxable(index, taxable)?;
        self.recompute();
        Ok(())
    }

    /// Picks a product on a line, filling description, price and taxability.
    pub fn select_product(&mut self, index: usize, product: &Product) -> Result<(), LineError> {
        self.lines.update(index, LineEdit::Product(Field::Value(product.id)))?;
        self.lines
            .update(index, LineEdit::Description(product.description.clone().or_else(|| Some(product.name.clone()))))?;
        if let Some(price) = product.sales_price {
            self.lines.update(index, LineEdit::UnitPrice(Field::Value(price)))?;
        }
        self.lines.set_taxable(index, product.taxable)?;
        self.recompute();
        Ok(())
    }

    /// Sets the manually selected tax rate entity.
    pub fn select_tax_rate(&mut self, rate: Option<TaxRate>) {
        if D::CHARGES_TAX {
            self.document.set_tax_rate_id(rate.as_ref().map(|r| r.id));
        }
        self.manual_rate = rate;
        self.stored_rate = None;
        self.recompute();
    }

    /// Sets (or clears) the auto-calculated rate for the current customer.
    pub fn set_auto_rate(&mut self, rate: Option<AutoTaxRate>) {
        self.auto_rate = rate;
        self.stored_rate = None;
        self.recompute();
    }

    pub fn selected_tax_rate_id(&self) -> Option<Uuid> {
        self.document.tax_rate_id()
    }

    /// Marks a field as touched and re-validates it.
    pub fn touch(&mut self, path: &str) {
        self.touched.insert(path.to_string());
        self.revalidate_touched();
    }

    /// The document as it would be submitted: current lines, flags and
    /// freshly computed totals.
    pub fn snapshot(&self) -> D {
        let mut document = self.document.clone();
        document.set_lines(self.lines.export());
        document.set_totals(self.compute());
        document
    }

    /// Full validation of the current state; also records every message.
    pub fn validate(&mut self) -> Result<(), ValidationErrors> {
        let result = self.schema.validate(&self.snapshot());
        self.errors = result.clone().err().unwrap_or_default();
        result
    }

    /// Submits through `gate`. The form keeps its state whatever the outcome.
    pub async fn submit<S>(&mut self, gate: &SubmissionGate, sink: &S) -> Result<D, SubmitError>
    where
        S: DocumentSink<D> + ?Sized,
    {
        let document = self.snapshot();
        match gate.submit(&document, sink).await {
            Ok(()) => {
                self.errors = ValidationErrors::new();
                Ok(document)
            }
            Err(SubmitError::Invalid(errors)) => {
                self.errors = errors.clone();
                Err(SubmitError::Invalid(errors))
            }
            Err(other) => Err(other),
        }
    }

    fn compute(&self) -> Totals {
        let rate = self.effective_rate().rate;
        compute_totals(self.lines.lines(), self.lines.taxable_flags(), rate)
    }

    fn recompute(&mut self) {
        self.totals = self.compute();
        debug!(
            "{} totals: subtotal {} tax {} total {}",
            D::KIND,
            self.totals.subtotal,
            self.totals.tax,
            self.totals.total
        );
        self.revalidate_touched();
    }

    /// Line-indexed paths no longer point at the same rows once lines shift.
    fn forget_line_paths(&mut self) {
        self.touched.retain(|path| !path.starts_with("lines["));
        self.errors.retain(|path| !path.starts_with("lines["));
    }

    fn revalidate_touched(&mut self) {
        if self.touched.is_empty() {
            return;
        }
        let current = match self.schema.validate(&self.snapshot()) {
            Ok(()) => ValidationErrors::new(),
            Err(errors) => errors,
        };
        for path in &self.touched {
            match current.get(path) {
                Some(message) => {
                    self.errors.remove(path);
                    self.errors.insert(path.clone(), message);
                }
                None => {
                    self.errors.remove(path);
                }
            }
        }
    }
}
