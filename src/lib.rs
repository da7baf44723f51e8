pub mod assembly;
pub mod config;
pub mod constants;
pub mod context;
pub mod domain;
pub mod error;
pub mod logging;
pub mod payload;
pub mod rcrainfo;
pub mod search;
pub mod storage;
pub mod sync;

pub use context::SyncContext;
pub use error::{Result, SyncError};
pub use sync::{PullResults, SyncOrchestrator};
