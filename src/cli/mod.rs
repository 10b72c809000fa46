//! Terminal presentation for each command.

pub mod analyze;
pub mod models;
pub mod setup;
pub mod ui;
pub mod validate;
