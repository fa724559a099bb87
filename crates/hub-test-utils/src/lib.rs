//! # Hub Test Utilities
//!
//! Shared test utilities for the Meeting Hub service.
//!
//! This crate provides:
//! - In-memory `UserRepository` / `MeetingRepository` with the same
//!   concurrency contracts as Postgres (`memory`)
//! - A recording `Notifier` and an in-memory `BlobStore` (`collaborators`)
//! - Config fixtures (`fixtures`)
//! - Server test harness (`TestHubServer` for E2E tests)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use hub_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> anyhow::Result<()> {
//!     let server = TestHubServer::spawn().await?;
//!     let response = reqwest::get(format!("{}/health", server.url())).await?;
//!     assert_eq!(response.status(), 200);
//!     Ok(())
//! }
//! ```

pub mod collaborators;
pub mod fixtures;
pub mod memory;
pub mod server_harness;

pub use collaborators::*;
pub use fixtures::*;
pub use memory::*;
pub use server_harness::*;
