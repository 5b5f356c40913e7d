use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// 启动入口的判定结果
///
/// 每个分支只携带构造启动命令所需的数据
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryPoint {
    /// 约定文件名扫描命中（相对服务端目录）
    KnownFile(PathBuf),
    /// 清单的 main 字段
    ManifestMain(PathBuf),
    /// 从清单 start 脚本中提取出的文件
    ManifestStartScript { script: String, file: PathBuf },
    /// 清单的通用 start 命令
    GenericStartCommand { script: String },
}

impl EntryPoint {
    pub fn kind(&self) -> &'static str {
        match self {
            EntryPoint::KnownFile(_) => "known-file",
            EntryPoint::ManifestMain(_) => "manifest-main",
            EntryPoint::ManifestStartScript { .. } => "manifest-start-script",
            EntryPoint::GenericStartCommand { .. } => "generic-start-command",
        }
    }

    /// 明确的入口文件，通用 start 命令没有
    pub fn file(&self) -> Option<&PathBuf> {
        match self {
            EntryPoint::KnownFile(file)
            | EntryPoint::ManifestMain(file)
            | EntryPoint::ManifestStartScript { file, .. } => Some(file),
            EntryPoint::GenericStartCommand { .. } => None,
        }
    }
}

/// 已确定的启动命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub entry: EntryPoint,
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    /// 服务器应监听的端口
    pub port: u16,
    pub env: Vec<(String, String)>,
}

impl LaunchSpec {
    /// 根据入口构造命令：文件入口用运行时直接执行，通用入口交给包管理器
    pub fn from_entry(
        entry: EntryPoint,
        runtime_program: &str,
        package_manager: &str,
        working_dir: impl Into<PathBuf>,
        port: u16,
    ) -> Self {
        let (program, args) = match entry.file() {
            Some(file) => (
                runtime_program.to_string(),
                vec![file.to_string_lossy().to_string()],
            ),
            None => (package_manager.to_string(), vec!["start".to_string()]),
        };

        Self {
            entry,
            program,
            args,
            working_dir: working_dir.into(),
            port,
            env: vec![("PORT".to_string(), port.to_string())],
        }
    }

    pub fn command_line(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

/// 进程生命周期状态
///
/// ```text
/// NotStarted → Spawning → AwaitingReadiness → Ready → Testing → Terminating → Terminated
///                  ↓               ↓                     ↓
///                Failed ←──────────┴─────────────────────┘
/// ```
/// 任何非终止状态（包括 Failed）都可以进入 Terminating，Terminating 只能到 Terminated。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessState {
    NotStarted,
    Spawning,
    AwaitingReadiness,
    Ready,
    Testing,
    Terminating,
    Terminated,
    Failed,
}

impl ProcessState {
    pub fn can_transition_to(self, next: ProcessState) -> bool {
        use ProcessState::*;
        match (self, next) {
            (NotStarted, Spawning) => true,
            (Spawning, AwaitingReadiness) => true,
            (AwaitingReadiness, Ready) => true,
            (Ready, Testing) => true,
            (Spawning | AwaitingReadiness | Testing, Failed) => true,
            (Terminating, Terminated) => true,
            (Terminating | Terminated, _) => false,
            (_, Terminating) => true,
            _ => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ProcessState::Terminated)
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ProcessState::*;

    #[test]
    fn test_happy_path_transitions() {
        let path = [
            NotStarted,
            Spawning,
            AwaitingReadiness,
            Ready,
            Testing,
            Terminating,
            Terminated,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_failed_only_from_active_states() {
        assert!(Spawning.can_transition_to(Failed));
        assert!(AwaitingReadiness.can_transition_to(Failed));
        assert!(Testing.can_transition_to(Failed));
        assert!(!Ready.can_transition_to(Failed));
        assert!(!NotStarted.can_transition_to(Failed));
    }

    #[test]
    fn test_teardown_reachable_after_failure() {
        assert!(Failed.can_transition_to(Terminating));
        assert!(!Failed.can_transition_to(Ready));
        assert!(!Terminating.can_transition_to(Failed));
        assert!(!Terminated.can_transition_to(Terminating));
    }

    #[test]
    fn test_launch_spec_from_entry() {
        let spec = LaunchSpec::from_entry(
            EntryPoint::KnownFile(PathBuf::from("src/server.js")),
            "node",
            "npm",
            "/tmp/backend",
            3000,
        );
        assert_eq!(spec.command_line(), "node src/server.js");
        assert_eq!(spec.env, vec![("PORT".to_string(), "3000".to_string())]);

        let generic = LaunchSpec::from_entry(
            EntryPoint::GenericStartCommand {
                script: "nodemon".to_string(),
            },
            "node",
            "npm",
            "/tmp/backend",
            3000,
        );
        assert_eq!(generic.command_line(), "npm start");
    }
}
