//! 进程监管 - 基础设施层
//!
//! 每个提交一个 supervisor，持有唯一的被测进程树：
//! - 在独立进程组中启动命令，输出写入有界 LogSink
//! - 记录状态机经过的每个状态
//! - 清理时终止整个进程组，然后无条件回收端口

use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{GradeError, GradeResult};
use crate::infrastructure::log_sink::LogSink;
use crate::infrastructure::port_reclaimer::{PortReclaimer, ReclaimReport};
use crate::infrastructure::terminator::GroupKillReport;
use crate::models::{LaunchSpec, ProcessState};

/// 进程组信号之后等待 leader 退出的时间
const REAP_TIMEOUT: Duration = Duration::from_secs(2);
/// 等待输出读取任务结束的时间，超时直接取消
const READER_DRAIN_TIMEOUT: Duration = Duration::from_millis(200);

#[cfg(windows)]
const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;

/// 已启动进程的标识
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessHandle {
    pub pid: u32,
    /// 进程组 id，子进程是组长，所以等于 pid
    pub pgid: i32,
    pub port: u16,
}

/// 清理阶段的结果
#[derive(Debug, Clone, Default)]
pub struct TeardownReport {
    pub group: Option<GroupKillReport>,
    pub exit_status: Option<String>,
    pub reclaim: Option<ReclaimReport>,
    pub reclaim_error: Option<String>,
    /// 被测进程的输出（取走后缓冲清空）
    pub output: Vec<String>,
    pub dropped_lines: usize,
}

impl TeardownReport {
    /// 端口是否已确认释放
    pub fn port_released(&self) -> bool {
        self.reclaim.is_some()
    }
}

/// 进程监管者
pub struct ProcessSupervisor {
    label: String,
    kill_grace: Duration,
    state: ProcessState,
    history: Vec<ProcessState>,
    child: Option<Child>,
    handle: Option<ProcessHandle>,
    port: Option<u16>,
    sink: LogSink,
    readers: Vec<JoinHandle<()>>,
    reclaimer: PortReclaimer,
}

impl ProcessSupervisor {
    pub fn new(
        label: impl Into<String>,
        reclaimer: PortReclaimer,
        kill_grace: Duration,
        log_capacity: usize,
    ) -> Self {
        let label = label.into();
        Self {
            sink: LogSink::new(label.clone(), log_capacity),
            label,
            kill_grace,
            state: ProcessState::NotStarted,
            history: vec![ProcessState::NotStarted],
            child: None,
            handle: None,
            port: None,
            readers: Vec::new(),
            reclaimer,
        }
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    /// 经过的所有状态，按顺序
    pub fn history(&self) -> &[ProcessState] {
        &self.history
    }

    pub fn handle(&self) -> Option<&ProcessHandle> {
        self.handle.as_ref()
    }

    /// 最近 n 行输出
    pub fn log_tail(&self, n: usize) -> Vec<String> {
        self.sink.tail(n)
    }

    fn transition(&mut self, next: ProcessState) -> GradeResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(GradeError::InvalidTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        debug!("[{}] 状态: {} → {}", self.label, self.state, next);
        self.state = next;
        self.history.push(next);
        Ok(())
    }

    /// 启动命令，成功后进入 AwaitingReadiness
    ///
    /// 系统拒绝创建进程（命令不存在、工作目录不存在）时进入 Failed
    pub fn start(&mut self, spec: &LaunchSpec) -> GradeResult<ProcessHandle> {
        self.transition(ProcessState::Spawning)?;
        self.port = Some(spec.port);

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .current_dir(&spec.working_dir)
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        command.process_group(0);
        #[cfg(windows)]
        command.creation_flags(CREATE_NEW_PROCESS_GROUP);

        let spawned = command.spawn().and_then(|child| match child.id() {
            Some(pid) => Ok((child, pid)),
            None => Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                "进程启动后立即退出",
            )),
        });

        let (mut child, pid) = match spawned {
            Ok(spawned) => spawned,
            Err(source) => {
                self.transition(ProcessState::Failed)?;
                return Err(GradeError::ProcessSpawn {
                    command: spec.command_line(),
                    source,
                });
            }
        };

        if let Some(stdout) = child.stdout.take() {
            self.readers.push(self.sink.attach(stdout));
        }
        if let Some(stderr) = child.stderr.take() {
            self.readers.push(self.sink.attach(stderr));
        }

        let handle = ProcessHandle {
            pid,
            pgid: pid as i32,
            port: spec.port,
        };
        info!(
            "[{}] ▶️ 已启动: {} (pid {}, 目录 {})",
            self.label,
            spec.command_line(),
            pid,
            spec.working_dir.display()
        );

        self.child = Some(child);
        self.handle = Some(handle);
        self.transition(ProcessState::AwaitingReadiness)?;
        Ok(handle)
    }

    pub fn mark_ready(&mut self) -> GradeResult<()> {
        self.transition(ProcessState::Ready)
    }

    pub fn mark_testing(&mut self) -> GradeResult<()> {
        self.transition(ProcessState::Testing)
    }

    pub fn mark_failed(&mut self) -> GradeResult<()> {
        self.transition(ProcessState::Failed)
    }

    /// 清理：终止进程组 → 回收 leader → 取走输出 → 回收端口 → Terminated
    ///
    /// 任何状态下都会走完，重复调用无副作用
    pub async fn stop(&mut self) -> TeardownReport {
        let mut report = TeardownReport::default();
        if self.state.is_terminal() {
            return report;
        }
        if self.state != ProcessState::Terminating {
            self.enter_teardown(ProcessState::Terminating);
        }

        if let Some(handle) = self.handle.take() {
            let group = self
                .reclaimer
                .terminator()
                .terminate_group(handle.pgid, self.kill_grace)
                .await;
            if !group.succeeded() {
                warn!("[{}] ⚠️ 进程组 {} 未完全退出: {:?}", self.label, handle.pgid, group.notes);
            }
            report.group = Some(group);
        }

        if let Some(mut child) = self.child.take() {
            report.exit_status = match tokio::time::timeout(REAP_TIMEOUT, child.wait()).await {
                Ok(Ok(status)) => Some(status.to_string()),
                Ok(Err(e)) => Some(format!("无法获取退出状态: {}", e)),
                Err(_) => {
                    let _ = child.kill().await;
                    Some("强制结束".to_string())
                }
            };
        }

        for mut reader in self.readers.drain(..) {
            if tokio::time::timeout(READER_DRAIN_TIMEOUT, &mut reader).await.is_err() {
                reader.abort();
            }
        }
        report.output = self.sink.drain();
        report.dropped_lines = self.sink.dropped();

        // 不管进程组是否干净退出，都要回收端口
        if let Some(port) = self.port {
            match self.reclaimer.reclaim(port).await {
                Ok(reclaim) => {
                    if !reclaim.killed.is_empty() {
                        warn!("[{}] 🔪 端口 {} 上的残留进程已结束: {:?}", self.label, port, reclaim.killed);
                    }
                    report.reclaim = Some(reclaim);
                }
                Err(e) => {
                    warn!("[{}] ⚠️ {}", self.label, e);
                    report.reclaim_error = Some(e.to_string());
                }
            }
        }

        self.enter_teardown(ProcessState::Terminated);
        debug!("[{}] 清理完成: {:?}", self.label, report.exit_status);
        report
    }

    fn enter_teardown(&mut self, next: ProcessState) {
        if let Err(e) = self.transition(next) {
            // 清理阶段的状态只会前进，这里不应该出现
            warn!("[{}] {}", self.label, e);
        }
    }
}

impl Drop for ProcessSupervisor {
    fn drop(&mut self) {
        // stop() 没有走完（例如 panic），尽力结束整个进程组
        if let Some(handle) = self.handle.take() {
            warn!("[{}] supervisor 未清理即被释放，强制结束进程组 {}", self.label, handle.pgid);
            #[cfg(unix)]
            {
                let _ = nix::sys::signal::killpg(
                    nix::unistd::Pid::from_raw(handle.pgid),
                    nix::sys::signal::Signal::SIGKILL,
                );
            }
        }
        for reader in self.readers.drain(..) {
            reader.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::terminator::platform_terminator;
    use crate::models::EntryPoint;
    use std::path::PathBuf;

    fn supervisor() -> ProcessSupervisor {
        ProcessSupervisor::new(
            "test",
            PortReclaimer::new(platform_terminator()),
            Duration::from_millis(100),
            50,
        )
    }

    fn free_port() -> u16 {
        std::net::TcpListener::bind("0.0.0.0:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    #[tokio::test]
    async fn test_spawn_failure_goes_through_failed_to_terminated() {
        let spec = LaunchSpec {
            entry: EntryPoint::KnownFile(PathBuf::from("index.js")),
            program: "definitely-not-a-real-program-xyz".to_string(),
            args: vec!["index.js".to_string()],
            working_dir: std::env::temp_dir(),
            port: free_port(),
            env: Vec::new(),
        };
        let mut supervisor = supervisor();

        let err = supervisor.start(&spec).unwrap_err();
        assert!(matches!(err, GradeError::ProcessSpawn { .. }));
        assert_eq!(supervisor.state(), ProcessState::Failed);

        let report = supervisor.stop().await;
        assert!(report.group.is_none());
        // 进程没起来也要回收端口
        assert!(report.port_released());
        assert_eq!(
            supervisor.history(),
            &[
                ProcessState::NotStarted,
                ProcessState::Spawning,
                ProcessState::Failed,
                ProcessState::Terminating,
                ProcessState::Terminated,
            ]
        );
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let mut supervisor = supervisor();
        supervisor.stop().await;
        let history_len = supervisor.history().len();
        supervisor.stop().await;
        assert_eq!(supervisor.history().len(), history_len);
        assert_eq!(supervisor.state(), ProcessState::Terminated);
    }

    #[test]
    fn test_out_of_order_transition_rejected() {
        let mut supervisor = supervisor();
        let err = supervisor.mark_ready().unwrap_err();
        assert!(matches!(err, GradeError::InvalidTransition { .. }));
        assert_eq!(supervisor.state(), ProcessState::NotStarted);
    }
}
