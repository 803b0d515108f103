//! Bearer/cookie token authentication for the admin API.

pub mod jwt;
pub mod middleware;
pub mod types;
