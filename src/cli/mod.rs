pub mod report;
pub mod setup;
pub mod transactions;
pub mod ui;
