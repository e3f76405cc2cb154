//! Common library for the House of Paradise services
//!
//! This crate provides shared functionality used across the auth and hotel
//! services, including database connectivity, the Redis cache, settings,
//! logging setup, error handling and access-token verification.
//!
//! ```rust,no_run
//! use common::database::{DatabaseConfig, init_pool, health_check};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = DatabaseConfig::from_env()?;
//!     let pool = init_pool(&config).await?;
//!     let is_healthy = health_check(&pool).await?;
//!     println!("Database health check: {}", is_healthy);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod database;
pub mod error;
pub mod settings;
pub mod telemetry;
pub mod token;
