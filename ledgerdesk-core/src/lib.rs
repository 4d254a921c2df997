//! Ledgerdesk core: line-item document forms for invoices, estimates, bills,
//! purchase orders, expenses and mileage, plus the HTTP surface that saves
//! them.

pub mod api;
pub mod assistant;
pub mod config;
pub mod db;
pub mod error;
pub mod form;
pub mod models;
pub mod options;
pub mod search;
pub mod store;
pub mod tax;
