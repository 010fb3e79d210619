//! HTTP helpers for upstream calls: client construction and response
//! classification into transient and permanent errors.

pub mod http;

pub use http::{build_client, check_response, retry_after};
