//! Shared data model and crypto helpers for the statmon pipeline.
//!
//! [`types`] defines the gauge/counter metric model and its JSON wire
//! format, shared by the agent, the server, and the storage backends.
//! [`sign`] implements per-metric HMAC-SHA256 authentication and [`crypto`]
//! the optional RSA-OAEP payload confidentiality layer.

pub mod crypto;
pub mod sign;
pub mod types;
