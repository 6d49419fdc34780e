pub mod jwt;
pub mod middleware;
pub mod otp;
pub mod rate_limit;
