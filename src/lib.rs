//! Course payment and enrollment backend.
//!
//! Orders are paid either by card through a third-party gateway or by bank
//! transfer with a manually approved payment slip. A confirmed payment grants
//! course access through idempotent enrollment reconciliation.

pub mod api;
pub mod config;
pub mod database;
pub mod error;
pub mod health;
pub mod logging;
pub mod middleware;
pub mod models;
pub mod payments;
pub mod services;
pub mod uploads;
