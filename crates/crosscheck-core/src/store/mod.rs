//! Durable issue records and run history.

pub mod database;
pub mod schema;

pub use self::database::IssueStore;
