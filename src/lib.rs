pub mod checksum;
pub mod commands;
pub mod config;
pub mod error;
pub mod fsutil;
pub mod logger;
pub mod observability;
pub mod pipeline;
pub mod platform;
pub mod process;
pub mod stages;
pub mod validation;
pub mod variables;

pub use commands::{CommandList, CommandSpec};
pub use config::Config;
pub use error::{ShipError, ShipResult};
pub use logger::{Logger, MemoryLogger, TracingLogger};
pub use pipeline::{Pipeline, StageStatus};
pub use platform::Platform;
pub use process::{CommandRunner, Invocation, SystemRunner};
pub use variables::Variables;
