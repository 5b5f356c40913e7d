//! 进程组终止能力 - 基础设施层
//!
//! 同一个接口后面是各平台的实现：
//! - 向整个进程组发信号（先 TERM，宽限期后 KILL）
//! - 确认进程组已退出
//! - 查询仍在监听某端口的进程，供端口回收兜底使用

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::GradeResult;

/// 一次进程组终止的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupKillReport {
    pub term_sent: bool,
    pub kill_sent: bool,
    /// 信号之后进程组是否仍然存活
    pub survivors: bool,
    pub notes: Vec<String>,
}

impl GroupKillReport {
    pub fn succeeded(&self) -> bool {
        !self.survivors
    }
}

/// 进程组终止能力
#[async_trait]
pub trait ProcessGroupTerminator: Send + Sync {
    /// 终止整个进程组：TERM → 等待 grace → KILL
    async fn terminate_group(&self, pgid: i32, grace: Duration) -> GroupKillReport;

    /// 进程组中是否还有存活进程
    fn group_alive(&self, pgid: i32) -> bool;

    /// 正在监听 `port` 的进程 id
    async fn listeners_on(&self, port: u16) -> GradeResult<Vec<u32>>;

    /// 强制结束单个进程，返回是否发出了信号
    async fn kill_pid(&self, pid: u32) -> bool;
}

/// 当前平台的实现
#[cfg(unix)]
pub fn platform_terminator() -> Arc<dyn ProcessGroupTerminator> {
    Arc::new(unix::UnixTerminator)
}

#[cfg(windows)]
pub fn platform_terminator() -> Arc<dyn ProcessGroupTerminator> {
    Arc::new(windows::WindowsTerminator)
}

#[cfg(unix)]
pub use unix::UnixTerminator;

#[cfg(windows)]
pub use windows::WindowsTerminator;

#[cfg(unix)]
mod unix {
    use super::*;

    use nix::errno::Errno;
    use nix::sys::signal::{kill, killpg, Signal};
    use nix::unistd::Pid;
    use tracing::debug;

    /// 通过 killpg 终止进程组
    pub struct UnixTerminator;

    #[async_trait]
    impl ProcessGroupTerminator for UnixTerminator {
        async fn terminate_group(&self, pgid: i32, grace: Duration) -> GroupKillReport {
            let mut report = GroupKillReport::default();
            let group = Pid::from_raw(pgid);

            match killpg(group, Signal::SIGTERM) {
                Ok(()) => report.term_sent = true,
                Err(Errno::ESRCH) => {
                    report.notes.push("进程组已不存在".to_string());
                    return report;
                }
                Err(e) => report.notes.push(format!("SIGTERM 失败: {}", e)),
            }

            tokio::time::sleep(grace).await;

            if self.group_alive(pgid) {
                match killpg(group, Signal::SIGKILL) {
                    Ok(()) => report.kill_sent = true,
                    Err(Errno::ESRCH) => {}
                    Err(e) => report.notes.push(format!("SIGKILL 失败: {}", e)),
                }
                // 等内核回收
                tokio::time::sleep(Duration::from_millis(100)).await;
            }

            report.survivors = self.group_alive(pgid);
            debug!("进程组 {} 终止结果: {:?}", pgid, report);
            report
        }

        fn group_alive(&self, pgid: i32) -> bool {
            // 僵尸进程等待 init 回收，不算存活
            #[cfg(target_os = "linux")]
            {
                if let Some(alive) = procfs_scan::group_has_live_members(pgid) {
                    return alive;
                }
            }

            // 信号 0 只检查存在性；EPERM 说明进程存在但不属于我们
            match killpg(Pid::from_raw(pgid), None) {
                Ok(()) => true,
                Err(Errno::EPERM) => true,
                Err(_) => false,
            }
        }

        async fn listeners_on(&self, port: u16) -> GradeResult<Vec<u32>> {
            listening_pids(port).await
        }

        async fn kill_pid(&self, pid: u32) -> bool {
            let Ok(raw) = i32::try_from(pid) else {
                return false;
            };
            kill(Pid::from_raw(raw), Signal::SIGKILL).is_ok()
        }
    }

    #[cfg(target_os = "linux")]
    async fn listening_pids(port: u16) -> GradeResult<Vec<u32>> {
        let pids = tokio::task::spawn_blocking(move || procfs_scan::listeners_on(port))
            .await
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))??;
        Ok(pids)
    }

    #[cfg(not(target_os = "linux"))]
    async fn listening_pids(port: u16) -> GradeResult<Vec<u32>> {
        let output = tokio::process::Command::new("lsof")
            .args(["-nP", "-t", &format!("-iTCP:{}", port), "-sTCP:LISTEN"])
            .output()
            .await?;
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter_map(|l| l.trim().parse().ok())
            .collect())
    }

    /// 通过 /proc 查找监听端口的进程，不依赖外部工具
    #[cfg(target_os = "linux")]
    pub(crate) mod procfs_scan {
        use std::collections::HashSet;
        use std::fs;

        /// /proc/net/tcp 中 LISTEN 状态的编码
        const TCP_LISTEN: &str = "0A";

        pub fn listeners_on(port: u16) -> std::io::Result<Vec<u32>> {
            let mut inodes = HashSet::new();
            for table in ["/proc/net/tcp", "/proc/net/tcp6"] {
                if let Ok(content) = fs::read_to_string(table) {
                    inodes.extend(listening_inodes(&content, port));
                }
            }
            if inodes.is_empty() {
                return Ok(Vec::new());
            }

            let mut pids = Vec::new();
            for entry in fs::read_dir("/proc")?.flatten() {
                let Some(pid) = entry.file_name().to_str().and_then(|s| s.parse::<u32>().ok()) else {
                    continue;
                };
                // 其他用户的进程没有权限读取，跳过
                let Ok(fds) = fs::read_dir(entry.path().join("fd")) else {
                    continue;
                };
                let holds_socket = fds.flatten().any(|fd| {
                    fs::read_link(fd.path())
                        .ok()
                        .and_then(|target| socket_inode(&target.to_string_lossy()))
                        .is_some_and(|inode| inodes.contains(&inode))
                });
                if holds_socket {
                    pids.push(pid);
                }
            }
            Ok(pids)
        }

        /// 进程组中是否有非僵尸进程，/proc 不可读时返回 None
        pub fn group_has_live_members(pgid: i32) -> Option<bool> {
            let entries = fs::read_dir("/proc").ok()?;
            let alive = entries.flatten().any(|entry| {
                fs::read_to_string(entry.path().join("stat"))
                    .ok()
                    .and_then(|stat| parse_stat(&stat))
                    .is_some_and(|(state, pgrp)| pgrp == pgid && state != 'Z' && state != 'X')
            });
            Some(alive)
        }

        /// 从 /proc/<pid>/stat 取出 (状态, 进程组)
        pub fn parse_stat(stat: &str) -> Option<(char, i32)> {
            // comm 可能包含空格和括号，从最后一个 ')' 之后开始解析
            let rest = &stat[stat.rfind(')')? + 1..];
            let mut fields = rest.split_whitespace();
            let state = fields.next()?.chars().next()?;
            let _ppid = fields.next()?;
            let pgrp = fields.next()?.parse().ok()?;
            Some((state, pgrp))
        }

        /// 解析 /proc/net/tcp 格式，返回监听 `port` 的 socket inode
        pub fn listening_inodes(content: &str, port: u16) -> Vec<u64> {
            content
                .lines()
                .skip(1)
                .filter_map(|line| {
                    let fields: Vec<&str> = line.split_whitespace().collect();
                    if fields.len() < 10 || fields[3] != TCP_LISTEN {
                        return None;
                    }
                    let local_port = fields[1].rsplit(':').next()?;
                    if u16::from_str_radix(local_port, 16).ok()? != port {
                        return None;
                    }
                    fields[9].parse().ok()
                })
                .collect()
        }

        fn socket_inode(link: &str) -> Option<u64> {
            link.strip_prefix("socket:[")?.strip_suffix(']')?.parse().ok()
        }

        #[cfg(test)]
        mod tests {
            use super::*;

            const SAMPLE: &str = "  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode
   0: 00000000:0BB8 00000000:0000 0A 00000000:00000000 00:00000000 00000000  1000        0 48213 1 0000000000000000 100 0 0 10 0
   1: 0100007F:0BB8 0100007F:D2F0 01 00000000:00000000 00:00000000 00000000  1000        0 48990 1 0000000000000000 20 4 30 10 -1
   2: 0100007F:1F90 00000000:0000 0A 00000000:00000000 00:00000000 00000000  1000        0 51234 1 0000000000000000 100 0 0 10 0
";

            #[test]
            fn test_only_listening_sockets_on_port() {
                // 0x0BB8 = 3000，第二行是已建立的连接
                assert_eq!(listening_inodes(SAMPLE, 3000), vec![48213]);
                assert_eq!(listening_inodes(SAMPLE, 8080), vec![51234]);
                assert!(listening_inodes(SAMPLE, 5500).is_empty());
            }

            #[test]
            fn test_stat_parsing_handles_odd_comm() {
                let stat = "4242 (node (worker) x) S 1 4242 4242 0 -1 4194560 120 0 0 0";
                assert_eq!(parse_stat(stat), Some(('S', 4242)));
                assert_eq!(parse_stat("17 (sleep) Z 1 4242 4242"), Some(('Z', 4242)));
                assert_eq!(parse_stat("garbage"), None);
            }

            #[test]
            fn test_socket_link_parsing() {
                assert_eq!(socket_inode("socket:[48213]"), Some(48213));
                assert_eq!(socket_inode("pipe:[123]"), None);
                assert_eq!(socket_inode("/dev/null"), None);
            }
        }
    }
}

#[cfg(windows)]
mod windows {
    use super::*;

    use tokio::process::Command;

    /// 通过 taskkill /T 终止进程树
    pub struct WindowsTerminator;

    #[async_trait]
    impl ProcessGroupTerminator for WindowsTerminator {
        async fn terminate_group(&self, pgid: i32, grace: Duration) -> GroupKillReport {
            let mut report = GroupKillReport::default();
            let pid = pgid.to_string();

            match Command::new("taskkill").args(["/PID", &pid, "/T"]).status().await {
                Ok(status) => report.term_sent = status.success(),
                Err(e) => report.notes.push(format!("taskkill 失败: {}", e)),
            }

            tokio::time::sleep(grace).await;

            if self.group_alive(pgid) {
                match Command::new("taskkill").args(["/PID", &pid, "/T", "/F"]).status().await {
                    Ok(status) => report.kill_sent = status.success(),
                    Err(e) => report.notes.push(format!("taskkill /F 失败: {}", e)),
                }
            }

            report.survivors = self.group_alive(pgid);
            report
        }

        fn group_alive(&self, pgid: i32) -> bool {
            std::process::Command::new("tasklist")
                .args(["/FI", &format!("PID eq {}", pgid), "/NH"])
                .output()
                .map(|out| String::from_utf8_lossy(&out.stdout).contains(&pgid.to_string()))
                .unwrap_or(false)
        }

        async fn listeners_on(&self, port: u16) -> GradeResult<Vec<u32>> {
            let output = Command::new("netstat").args(["-ano", "-p", "TCP"]).output().await?;
            let suffix = format!(":{}", port);
            let mut pids: Vec<u32> = String::from_utf8_lossy(&output.stdout)
                .lines()
                .filter_map(|line| {
                    let fields: Vec<&str> = line.split_whitespace().collect();
                    if fields.len() == 5 && fields[1].ends_with(&suffix) && fields[3] == "LISTENING" {
                        fields[4].parse().ok()
                    } else {
                        None
                    }
                })
                .collect();
            pids.sort_unstable();
            pids.dedup();
            Ok(pids)
        }

        async fn kill_pid(&self, pid: u32) -> bool {
            Command::new("taskkill")
                .args(["/PID", &pid.to_string(), "/F"])
                .status()
                .await
                .map(|s| s.success())
                .unwrap_or(false)
        }
    }
}
