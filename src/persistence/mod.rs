//! Persistence module - Launch parameters, settings and instance history

mod database;

pub use database::Database;
