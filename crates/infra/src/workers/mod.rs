//! Background execution: recurring flows and channel-fed workers.

mod channel_worker;
mod launcher;
mod shutdown;

pub use channel_worker::{ChannelConfig, ChannelWorker};
pub use launcher::{FlowHandle, FlowLauncher, LaunchConfig, LaunchMode, LaunchStats, RunContext};
pub use shutdown::Shutdown;
