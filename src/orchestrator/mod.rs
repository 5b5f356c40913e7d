//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批量评分和流程调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `app` - 应用入口
//! - 初始化运行日志
//! - 加载名单（TOML 文件或目录）
//!
//! ### `grading_orchestrator` - 批量评分
//! - 严格顺序执行，一个提交完全清理后才开始下一个
//! - 隔离单个提交的 panic
//! - 每个提交后保存累计结果，提交之间冷却
//! - 输出全局统计信息
//!
//! ### `submission_grader` - 单个提交评分
//! - 结构检查 → 入口解析 → 启动 → 就绪 → 测试 → 清理 → 计分
//! - 唯一持有 `ProcessSupervisor` 的地方
//!
//! ## 层次关系
//!
//! ```text
//! grading_orchestrator (处理 Vec<Submission>)
//!     ↓
//! submission_grader (处理单个 Submission)
//!     ↓
//! battery::TestBattery (一组检查)
//!     ↓
//! services (能力层：entry_point / readiness / scoring / record_store)
//!     ↓
//! infrastructure (基础设施：ProcessSupervisor / PortReclaimer / HttpClient)
//! ```

pub mod app;
pub mod grading_orchestrator;
pub mod submission_grader;

pub use app::App;
pub use grading_orchestrator::GradingOrchestrator;
pub use submission_grader::SubmissionGrader;
