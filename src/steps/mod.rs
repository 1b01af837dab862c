pub mod archive;
pub mod delete;
pub mod dump;
pub mod transfer;

pub use archive::archive;
pub use delete::{Confirm, DeleteOutcome, StdinConfirm, delete};
pub use dump::dump_database;
pub use transfer::{StagingArea, ship, stage};
