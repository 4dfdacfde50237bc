pub mod chunk;
pub mod distribution;
pub mod logline;
pub mod metrics;
pub mod processor;
pub mod results;
pub mod worker;

pub use chunk::{plan, plan_file, try_plan, ChunkDescriptor, FileLineLocator, WorkRequest};
pub use distribution::{DistributeRequest, DistributionReport};
pub use logline::{parse_line, LogEntry, LogLevel, ParseError};
pub use metrics::{merge_all, MetricsReport, MetricsSummary};
pub use processor::{process, process_file_chunk, read_file_range};
pub use results::{ChunkFailure, ChunkResult, ErrorBody};
pub use worker::{
    HealthResponse, WorkerHeartbeatRequest, WorkerHeartbeatResponse, WorkerId,
    WorkerRegisterRequest, WorkerRegisterResponse, WorkerStatus, WorkerView,
};
