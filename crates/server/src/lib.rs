#![forbid(unsafe_code)]

pub mod handler;
pub mod http;

pub use handler::{execute, execute_line};
pub use http::{CommandRequest, CommandResponse, router};
