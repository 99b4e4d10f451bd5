//! Maintenance-record lifecycle: checklist answers, dual-role signatures,
//! gated completion with gap-free folios, and an audit trail for every
//! mutation.

pub mod audit;
pub mod catalog;
pub mod checklist;
pub mod cli;
pub mod config;
pub mod demo;
pub mod error;
pub mod folio;
pub mod logging;
pub mod service;
pub mod signature;
pub mod state_machine;
pub mod store;
pub mod ui;
