#![forbid(unsafe_code)]

mod db;
mod entry;
mod queue;
mod waiter;

pub use db::Db;
