//! Shared HTTP utilities for completion providers.

mod client;

pub use client::{AuthConfig, HttpClient};
