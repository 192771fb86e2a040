pub mod config;
pub mod logging;

pub mod api;
pub mod backlog;
pub mod budget;
pub mod classifier;
pub mod discovery;
pub mod lock;
pub mod model;
pub mod pipeline;
pub mod state;
pub mod storage;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
