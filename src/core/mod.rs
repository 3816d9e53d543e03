pub mod client;
pub mod framing;
pub mod http;
pub mod socket;

/// Client identifier sent with every request.
pub const API_VERSION: &str = concat!("captcha-client/Rust v", env!("CARGO_PKG_VERSION"));

