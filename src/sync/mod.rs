pub mod engine;
pub mod iso;
pub mod types;

pub use engine::SyncEngine;
pub use iso::{from_iso, to_iso};
pub use types::{
    PullResponse, PushItemBody, PushItemResponse, SyncCounters, SyncStatus, SyncTransport,
    SyncTransportError, VersionHeaders, WireItem,
};
