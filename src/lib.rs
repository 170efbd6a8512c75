pub mod config;
pub mod error;
pub mod lb_state;
pub mod policy;
pub mod poller;
pub mod profiler;
pub mod proxy;
pub mod registry;
pub mod server;

pub use config::{LBConfig, RefreshMode};
pub use error::{PollError, ProbeError, RouteError};
pub use lb_state::LBState;
pub use registry::{Worker, WorkerRegistry, WorkerSnapshot};
