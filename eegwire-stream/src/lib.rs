pub mod clock;
pub mod config;
pub mod control;
pub mod runtime;
pub mod sink;
pub mod source;
pub mod state;

pub use clock::HostClock;
pub use config::{Config, GroupsConfig, SinkConfig, SourceConfig, StreamConfig};
pub use control::ControlResponse;
pub use runtime::{StreamSetup, run_stream};
pub use sink::FrameSink;
pub use sink::file::CsvSink;
pub use sink::log::LogSink;
pub use sink::memory::MemorySink;
pub use source::NotificationSource;
pub use source::mock::MockSource;
pub use source::tcp::TcpSource;
pub use state::{StreamState, StreamStats};
