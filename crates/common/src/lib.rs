#![forbid(unsafe_code)]

mod error;

pub use error::*;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_URL: &str = "http://127.0.0.1:8080/";
