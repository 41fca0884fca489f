//! # Voyage Checkout Backend
//!
//! HTTP implementation of the checkout collaborator traits over `reqwest`.
//!
//! ```no_run
//! use std::time::Duration;
//! use voyage_checkout_backend::BackendClient;
//!
//! # fn main() -> Result<(), voyage_checkout_core::error::ApiError> {
//! let client = BackendClient::new("https://api.voyage.example/api", Duration::from_secs(30))?
//!     .with_fallback(Some("https://backup.voyage.example/api".to_string()))
//!     .with_token(std::env::var("VOYAGE_API_TOKEN").ok());
//! # let _ = client;
//! # Ok(())
//! # }
//! ```

mod client;

pub use client::{BackendClient, DEFAULT_TIMEOUT};
