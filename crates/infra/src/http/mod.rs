//! Outbound HTTP plumbing shared by all provider integrations

mod client;

pub use client::{ensure_success, HttpClient, HttpClientBuilder};
