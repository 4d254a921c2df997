pub mod document;
pub mod field;
pub mod gate;
pub mod lines;
pub mod mileage;
pub mod schema;
pub mod totals;


pub use document::DocumentForm;
pub use field::Field;
pub use gate::{DocumentSink, GateState, SubmissionGate};
pub use lines::{IndexedMeta, LineCollection};
pub use mileage::MileageForm;
pub use schema::{Schema, ValidationErrors};
pub use totals::{compute_totals, round2, EffectiveRate, RateSource, Totals};
