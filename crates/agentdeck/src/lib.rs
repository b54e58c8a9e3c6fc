pub mod server;

pub mod error;
pub mod config;
pub mod state;
pub mod mutation;
pub mod apply;
pub mod engine;
pub mod bus;
pub mod storage;
pub mod catchup;
pub mod bridge;

pub use crate::bus::StateChanged;
pub use crate::config::EngineConfig;
pub use crate::engine::SyncEngine;
pub use crate::error::{EngineError, EngineResult};
pub use crate::mutation::Mutation;
pub use crate::state::{GlobalState, SlotState, WorkspaceState};
