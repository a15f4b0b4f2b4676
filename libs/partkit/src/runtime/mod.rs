mod runner;
mod shutdown;

pub use runner::{run, RunOptions, ShutdownOptions};
pub use shutdown::{cancel_on_signal, next_signal, ShutdownSignal};
