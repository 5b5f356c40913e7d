//! 端口回收 - 基础设施层
//!
//! 进程组终止之后，被测服务器的孙进程可能已经脱离进程组并继续占用端口。
//! 这里按端口查找监听者并逐个结束，直到端口可以重新绑定。

use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{GradeError, GradeResult};
use crate::infrastructure::terminator::ProcessGroupTerminator;

/// 最多尝试几轮
const MAX_ATTEMPTS: u32 = 3;
/// 每轮结束后等待端口释放的时间
const SETTLE_DELAY: Duration = Duration::from_millis(300);

/// 一次回收的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReclaimReport {
    pub port: u16,
    /// 被结束的进程
    pub killed: Vec<u32>,
    pub attempts: u32,
}

/// 检查绑定的地址：IPv4 / IPv6 的通配地址和回环地址
const PROBE_ADDRS: [IpAddr; 4] = [
    IpAddr::V4(Ipv4Addr::UNSPECIFIED),
    IpAddr::V6(Ipv6Addr::UNSPECIFIED),
    IpAddr::V4(Ipv4Addr::LOCALHOST),
    IpAddr::V6(Ipv6Addr::LOCALHOST),
];

/// 端口是否可以绑定
///
/// 只监听 `::1` 的进程不会挡住 `0.0.0.0`，所以两个地址族都要试。
/// 本机不支持 IPv6 时，IPv6 地址的绑定失败不算占用。
pub fn port_is_free(port: u16) -> bool {
    PROBE_ADDRS.iter().all(|ip| match TcpListener::bind(SocketAddr::new(*ip, port)) {
        Ok(_) => true,
        Err(e) => e.kind() != ErrorKind::AddrInUse,
    })
}

/// 端口回收器
#[derive(Clone)]
pub struct PortReclaimer {
    terminator: Arc<dyn ProcessGroupTerminator>,
}

impl PortReclaimer {
    pub fn new(terminator: Arc<dyn ProcessGroupTerminator>) -> Self {
        Self { terminator }
    }

    pub fn terminator(&self) -> &Arc<dyn ProcessGroupTerminator> {
        &self.terminator
    }

    /// 结束所有监听 `port` 的进程，直到端口空闲
    ///
    /// 评分进程自身永远不会被结束
    pub async fn reclaim(&self, port: u16) -> GradeResult<ReclaimReport> {
        let own_pid = std::process::id();
        let mut report = ReclaimReport {
            port,
            ..Default::default()
        };

        for attempt in 1..=MAX_ATTEMPTS {
            report.attempts = attempt;

            // 绑定检查之外再查一次监听表，两者都干净才算空闲
            let holders: Vec<u32> = match self.terminator.listeners_on(port).await {
                Ok(pids) => pids.into_iter().filter(|pid| *pid != own_pid).collect(),
                Err(e) if port_is_free(port) => {
                    debug!("端口 {} 可绑定，监听表不可用: {}", port, e);
                    return Ok(report);
                }
                Err(e) => return Err(e),
            };
            if holders.is_empty() && port_is_free(port) {
                debug!("端口 {} 已空闲", port);
                return Ok(report);
            }

            if holders.is_empty() {
                // 没找到监听者，可能是 TIME_WAIT 或无权限查看
                debug!("端口 {} 未找到监听进程 (第 {} 次)", port, attempt);
            }

            for pid in holders {
                if self.terminator.kill_pid(pid).await {
                    warn!("🔪 结束占用端口 {} 的残留进程 {}", port, pid);
                    if !report.killed.contains(&pid) {
                        report.killed.push(pid);
                    }
                }
            }

            tokio::time::sleep(SETTLE_DELAY).await;
        }

        let holders: Vec<u32> = self
            .terminator
            .listeners_on(port)
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|pid| *pid != own_pid)
            .collect();
        if holders.is_empty() && port_is_free(port) {
            return Ok(report);
        }
        Err(GradeError::PortReclaimFailure { port, holders })
    }

    /// 启动前检查：端口被占用时先回收
    pub async fn ensure_free(&self, port: u16) -> GradeResult<()> {
        let report = self.reclaim(port).await?;
        if !report.killed.is_empty() {
            info!("端口 {} 启动前被占用，已结束进程 {:?}", port, report.killed);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    use crate::infrastructure::terminator::GroupKillReport;

    /// 报告一个固定的监听者，并记录 kill 调用
    struct FakeTerminator {
        holders: Vec<u32>,
        killed: Mutex<Vec<u32>>,
    }

    #[async_trait]
    impl ProcessGroupTerminator for FakeTerminator {
        async fn terminate_group(&self, _pgid: i32, _grace: Duration) -> GroupKillReport {
            GroupKillReport::default()
        }

        fn group_alive(&self, _pgid: i32) -> bool {
            false
        }

        async fn listeners_on(&self, _port: u16) -> GradeResult<Vec<u32>> {
            Ok(self.holders.clone())
        }

        async fn kill_pid(&self, pid: u32) -> bool {
            self.killed.lock().unwrap().push(pid);
            true
        }
    }

    fn fake(holders: Vec<u32>) -> Arc<FakeTerminator> {
        Arc::new(FakeTerminator {
            holders,
            killed: Mutex::new(Vec::new()),
        })
    }

    fn unused_port() -> u16 {
        TcpListener::bind("0.0.0.0:0").unwrap().local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn test_free_port_needs_no_kill() {
        let port = unused_port();
        let fake = fake(Vec::new());
        let reclaimer = PortReclaimer::new(fake.clone());

        let report = reclaimer.reclaim(port).await.unwrap();
        assert!(report.killed.is_empty());
        assert_eq!(report.attempts, 1);
        assert!(fake.killed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_listed_holder_is_killed_even_if_port_binds() {
        // 监听表里有人就要结束，不能只相信绑定检查
        let port = unused_port();
        let fake = fake(vec![4242]);
        let reclaimer = PortReclaimer::new(fake.clone());

        let report = reclaimer.reclaim(port).await;
        assert!(fake.killed.lock().unwrap().contains(&4242));
        // 假的监听者一直在，回收最终失败并报告它
        assert!(matches!(report, Err(GradeError::PortReclaimFailure { ref holders, .. }) if holders == &[4242]));
    }

    #[test]
    fn test_ipv6_loopback_listener_makes_port_busy() {
        let Ok(listener) = TcpListener::bind("[::1]:0") else {
            eprintln!("IPv6 not available, skipping");
            return;
        };
        let port = listener.local_addr().unwrap().port();

        assert!(!port_is_free(port));
        drop(listener);
        assert!(port_is_free(port));
    }

    #[test]
    fn test_ipv4_loopback_listener_makes_port_busy() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(!port_is_free(port));
    }

    #[tokio::test]
    async fn test_never_kills_own_process() {
        // 自己持有端口，回收器只能看到自己，必须放弃而不是自杀
        let listener = TcpListener::bind("0.0.0.0:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let fake = fake(vec![std::process::id()]);
        let reclaimer = PortReclaimer::new(fake.clone());

        let err = reclaimer.reclaim(port).await.unwrap_err();
        assert!(matches!(err, GradeError::PortReclaimFailure { port: p, ref holders } if p == port && holders.is_empty()));
        assert!(fake.killed.lock().unwrap().is_empty());
        drop(listener);
    }
}
