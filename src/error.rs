use std::path::PathBuf;

use thiserror::Error;

/// 评分系统错误类型
///
/// 结构性错误（目录 / 清单 / 入口缺失）会让单个提交直接得零分，不会启动进程；
/// 进程与就绪错误会让该提交 `server_started = false`，所有测试被跳过；
/// 其余错误只记录日志，不会中断整轮评分。
#[derive(Debug, Error)]
pub enum GradeError {
    /// 提交的仓库目录不存在
    #[error("仓库目录不存在: {}", .path.display())]
    MissingSourceDirectory { path: PathBuf },

    /// 服务端目录不存在
    #[error("服务端目录不存在: {}", .path.display())]
    MissingServerDirectory { path: PathBuf },

    /// 项目清单文件不存在
    #[error("项目清单文件不存在: {}", .path.display())]
    MissingManifest { path: PathBuf },

    /// 无法确定启动入口
    #[error("无法确定启动入口 ({}): {reason}", .server_dir.display())]
    EntryPointNotFound { server_dir: PathBuf, reason: String },

    /// 操作系统拒绝创建进程
    #[error("启动进程失败 ({command}): {source}")]
    ProcessSpawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// 服务器在超时时间内没有响应
    #[error("服务器在 {timeout_secs} 秒内未就绪 ({url}, 共尝试 {attempts} 次)")]
    ReadinessTimeout {
        url: String,
        timeout_secs: u64,
        attempts: u32,
    },

    /// 单个测试用例执行失败（不致命）
    #[error("测试执行失败 ({test}): {message}")]
    TestExecution { test: String, message: String },

    /// 端口回收失败（不致命，但可能影响下一个提交）
    #[error("端口 {port} 回收失败, 仍被进程占用: {holders:?}")]
    PortReclaimFailure { port: u16, holders: Vec<u32> },

    /// 结果持久化失败
    #[error("结果持久化失败 ({}): {source}", .path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// 名单加载失败
    #[error("名单错误: {0}")]
    Roster(String),

    /// 配置错误
    #[error("配置错误: {0}")]
    Config(String),

    /// 浏览器相关错误
    #[error("浏览器错误: {0}")]
    Browser(String),

    /// 状态机非法转换
    #[error("非法的进程状态转换: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    /// 其他 I/O 错误
    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),
}

impl GradeError {
    /// 结构性错误：不尝试启动进程，直接生成零分记录
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            GradeError::MissingSourceDirectory { .. }
                | GradeError::MissingServerDirectory { .. }
                | GradeError::MissingManifest { .. }
                | GradeError::EntryPointNotFound { .. }
        )
    }

    /// 启动失败：进程未能创建或未能就绪
    pub fn is_launch_failure(&self) -> bool {
        matches!(
            self,
            GradeError::ProcessSpawn { .. } | GradeError::ReadinessTimeout { .. }
        )
    }
}

// ========== 从常见错误类型转换 ==========

impl From<serde_json::Error> for GradeError {
    fn from(err: serde_json::Error) -> Self {
        GradeError::Persistence {
            path: PathBuf::new(),
            source: Box::new(err),
        }
    }
}

impl From<toml::de::Error> for GradeError {
    fn from(err: toml::de::Error) -> Self {
        GradeError::Config(err.to_string())
    }
}

impl From<chromiumoxide::error::CdpError> for GradeError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        GradeError::Browser(err.to_string())
    }
}

// ========== 便捷构造函数 ==========

impl GradeError {
    /// 创建入口缺失错误
    pub fn entry_point_not_found(server_dir: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        GradeError::EntryPointNotFound {
            server_dir: server_dir.into(),
            reason: reason.into(),
        }
    }

    /// 创建测试执行错误
    pub fn test_execution(test: impl Into<String>, message: impl Into<String>) -> Self {
        GradeError::TestExecution {
            test: test.into(),
            message: message.into(),
        }
    }

    /// 创建持久化错误
    pub fn persistence(
        path: impl Into<PathBuf>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        GradeError::Persistence {
            path: path.into(),
            source: Box::new(source),
        }
    }
}

// ========== Result 类型别名 ==========

/// 评分结果类型
pub type GradeResult<T> = Result<T, GradeError>;
