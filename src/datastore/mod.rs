pub mod frecency;
pub mod service;

pub use service::{AddItemOptions, AddVisitOptions, DatastoreService, ItemUpdateFields};
