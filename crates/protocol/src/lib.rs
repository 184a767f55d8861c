#![forbid(unsafe_code)]

mod command;
mod parse;
mod reply;

pub use command::{Command, SetCondition, SetOptions};
pub use parse::{Parse, parse_seconds};
pub use reply::Reply;
