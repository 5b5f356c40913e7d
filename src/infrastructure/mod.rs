//! 基础设施层（Infrastructure Layer）
//!
//! 持有稀缺资源（子进程、端口、浏览器页面），只暴露能力，不认识评分流程。

pub mod http_client;
pub mod js_executor;
pub mod log_sink;
pub mod port_reclaimer;
pub mod process_supervisor;
pub mod terminator;

pub use http_client::{HttpClient, HttpOutcome, HttpReply, NetworkError};
pub use js_executor::JsExecutor;
pub use log_sink::LogSink;
pub use port_reclaimer::{port_is_free, PortReclaimer, ReclaimReport};
pub use process_supervisor::{ProcessHandle, ProcessSupervisor, TeardownReport};
pub use terminator::{platform_terminator, GroupKillReport, ProcessGroupTerminator};
