pub mod tables;

pub use tables::{SyncTableRequest, SyncTableResponse};
