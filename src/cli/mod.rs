pub mod quotes;
pub mod setup;
pub mod snapshot;
pub mod ui;
