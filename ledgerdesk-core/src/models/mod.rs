pub mod document;
pub mod line;
pub mod mileage;
pub mod reference;

pub use document::{
    Bill, Document, DocumentKind, Estimate, Expense, Invoice, LineDocument, PurchaseOrder,
};
pub use line::{Line, LineEdit};
pub use mileage::MileageTrip;
