//! # Exam Grader
//!
//! 一个用于自动化评分学生后端作业的 Rust 应用程序：
//! 逐个启动提交的服务器，等待就绪，跑固定的接口测试，计分，然后彻底清理。
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源（子进程、端口、浏览器页面），只暴露能力
//! - `ProcessSupervisor` - 唯一的子进程 owner，负责启动和整组终止
//! - `PortReclaimer` / `ProcessGroupTerminator` - 按端口回收残留进程
//! - `HttpClient` - HTTP 状态码是返回值，只有网络失败才是错误
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，每个只做一件事
//! - `EntryPointResolver` - 决定启动命令
//! - `ReadinessProbe` - 探测服务器就绪
//! - `ScoreAggregator` - 计分
//! - `RecordSink` / `RunLog` - 保存结果、写运行日志
//!
//! ### ③ 测试集层（Battery）
//! - `battery/` - 定义"对一个就绪的服务器跑一组检查"
//! - `ApiTestBattery` - 后端接口检查
//! - `UiTestBattery` - 前端页面检查（可选）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/grading_orchestrator` - 批量评分，顺序执行、故障隔离、增量保存
//! - `orchestrator/submission_grader` - 单个提交的完整流程
//!
//! ## 模块结构

pub mod battery;
pub mod browser;
pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;

// 重新导出常用类型
pub use battery::{ApiTestBattery, TestBattery, UiTestBattery};
pub use config::Config;
pub use error::{GradeError, GradeResult};
pub use infrastructure::{PortReclaimer, ProcessSupervisor};
pub use models::{GradingRecord, Submission, TestResult};
pub use orchestrator::{App, GradingOrchestrator};
