pub mod models;
pub mod store;

pub use models::{GameRecord, ScoringNotice};
pub use store::{GameStore, SharedStore};
