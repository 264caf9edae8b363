pub mod in_memory_store;
pub mod json_file_store;
pub mod observability;
pub mod probes;
pub mod step_executors;

pub use in_memory_store::InMemoryStore;
pub use json_file_store::JsonFileStore;
pub use observability::*;
pub use probes::{DefaultProbeFactory, HttpProbe, StaticProbe, TcpProbe};
pub use step_executors::{HttpStepExecutor, RecordingStepExecutor, StepExecutorRegistry};
