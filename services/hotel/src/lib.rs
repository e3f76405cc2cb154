//! House of Paradise hotel service.
//!
//! Catalogue, bookings, reviews, personalization, loyalty and trips. Built
//! as a library so the binary and the database-backed tests in `tests/`
//! share one build.

use sqlx::migrate::Migrator;

pub mod error;
pub mod events;
pub mod loyalty;
pub mod middleware;
pub mod models;
pub mod pricing;
pub mod repositories;
pub mod repricing;
pub mod routes;
pub mod scheduler;
pub mod state;

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");
