use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::line::Line;

/// Field path -> message. One message per path; the first failure wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, String>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.0.entry(path.into()).or_insert_with(|| message.into());
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.0.get(path).map(String::as_str)
    }

    pub fn remove(&mut self, path: &str) -> Option<String> {
        self.0.remove(path)
    }

    /// Keeps only the paths for which `keep` returns true.
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.0.retain(|path, _| keep(path));
    }

    pub fn contains(&self, path: &str) -> bool {
        self.0.contains_key(path)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (path, message) in &self.0 {
            if !first {
                write!(f, "; ")?;
            }
            write!(f, "{}: {}", path, message)?;
            first = false;
        }
        Ok(())
    }
}

/// Per-line rules shared by every line-bearing document.
#[derive(Debug, Clone, Copy)]
pub struct LineRules {
    pub min_lines: usize,
    pub require_product: bool,
    pub require_account: bool,
}

impl Default for LineRules {
    fn default() -> Self {
        Self {
            min_lines: 1,
            require_product: false,
            require_account: false,
        }
    }
}

type Check<D> = Box<dyn Fn(&D, &mut ValidationErrors) + Send + Sync>;

/// Declarative validation contract for one document type.
///
/// Built once per type from the generic rule vocabulary in
/// [`SchemaBuilder`]; each document kind only states its header fields,
/// its line shape and its cross-field rules.
pub struct Schema<D> {
    name: &'static str,
    checks: Vec<Check<D>>,
}

impl<D: 'static> Schema<D> {
    pub fn builder(name: &'static str) -> SchemaBuilder<D> {
        SchemaBuilder {
            name,
            checks: Vec::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Validates the whole document.
    pub fn validate(&self, document: &D) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        for check in &self.checks {
            check(document, &mut errors);
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Re-validates a single field path, used when the user leaves a field.
    pub fn validate_field(&self, document: &D, path: &str) -> Option<String> {
        match self.validate(document) {
            Ok(()) => None,
            Err(mut errors) => errors.remove(path),
        }
    }
}

pub struct SchemaBuilder<D> {
    name: &'static str,
    checks: Vec<Check<D>>,
}

impl<D: 'static> SchemaBuilder<D> {
    fn push(mut self, check: impl Fn(&D, &mut ValidationErrors) + Send + Sync + 'static) -> Self {
        self.checks.push(Box::new(check));
        self
    }

    pub fn required(
        self,
        path: &'static str,
        message: &'static str,
        present: impl Fn(&D) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.push(move |doc, errors| {
            if !present(doc) {
                errors.insert(path, message);
            }
        })
    }

    pub fn required_text(
        self,
        path: &'static str,
        message: &'static str,
        text: impl Fn(&D) -> &str + Send + Sync + 'static,
    ) -> Self {
        self.push(move |doc, errors| {
            if text(doc).trim().is_empty() {
                errors.insert(path, message);
            }
        })
    }

    pub fn one_of(
        self,
        path: &'static str,
        value: impl Fn(&D) -> &str + Send + Sync + 'static,
        allowed: &'static [&'static str],
    ) -> Self {
        self.push(move |doc, errors| {
            let v = value(doc);
            if !allowed.contains(&v) {
                errors.insert(
                    path,
                    format!("Invalid value '{}'; expected one of: {}", v, allowed.join(", ")),
                );
            }
        })
    }

    /// Lower bound on an optional number; absent values are left to `required`.
    pub fn min(
        self,
        path: &'static str,
        message: &'static str,
        value: impl Fn(&D) -> Option<Decimal> + Send + Sync + 'static,
        bound: Decimal,
        inclusive: bool,
    ) -> Self {
        self.push(move |doc, errors| {
            if let Some(v) = value(doc) {
                let ok = if inclusive { v >= bound } else { v > bound };
                if !ok {
                    errors.insert(path, message);
                }
            }
        })
    }

    /// Whole-document refinement: `later` may not precede `earlier`.
    /// Skipped while either date is missing.
    pub fn date_order(
        self,
        path: &'static str,
        message: &'static str,
        earlier: impl Fn(&D) -> Option<NaiveDate> + Send + Sync + 'static,
        later: impl Fn(&D) -> Option<NaiveDate> + Send + Sync + 'static,
    ) -> Self {
        self.push(move |doc, errors| {
            if let (Some(start), Some(end)) = (earlier(doc), later(doc)) {
                if end < start {
                    errors.insert(path, message);
                }
            }
        })
    }

    pub fn lines(
        self,
        lines: impl Fn(&D) -> &[Line] + Send + Sync + 'static,
        rules: LineRules,
    ) -> Self {
        self.push(move |doc, errors| validate_lines(lines(doc), &rules, errors))
    }

    pub fn refine(
        self,
        path: &'static str,
        check: impl Fn(&D) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.push(move |doc, errors| {
            if let Some(message) = check(doc) {
                errors.insert(path, message);
            }
        })
    }

    pub fn build(self) -> Schema<D> {
        Schema {
            name: self.name,
            checks: self.checks,
        }
    }
}

pub fn line_path(index: usize, field: &str) -> String {
    format!("lines[{}].{}", index, field)
}

fn validate_lines(lines: &[Line], rules: &LineRules, errors: &mut ValidationErrors) {
    if lines.len() < rules.min_lines {
        errors.insert("lines", "At least one line item is required");
    }

    for (i, line) in lines.iter().enumerate() {
        match line.quantity.get() {
            None => errors.insert(line_path(i, "quantity"), "Quantity is required"),
            Some(q) if q <= Decimal::ZERO => {
                errors.insert(line_path(i, "quantity"), "Quantity must be greater than 0")
            }
            Some(_) => {}
        }

        match line.unit_price.get() {
            None => errors.insert(line_path(i, "unit_price"), "Unit price is required"),
            Some(p) if p < Decimal::ZERO => {
                errors.insert(line_path(i, "unit_price"), "Unit price cannot be negative")
            }
            Some(_) => {}
        }

        if rules.require_product && !line.product_id.is_present() {
            errors.insert(line_path(i, "product_id"), "Select a product or service");
        }
        if rules.require_account && !line.account_id.is_present() {
            errors.insert(line_path(i, "account_id"), "Select an account");
        }
    }
}
