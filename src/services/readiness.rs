//! 就绪探测 - 业务能力层
//!
//! 固定间隔请求一个安全的只读路径，收到任何 HTTP 响应（包括错误状态码）即视为就绪。
//! 连接被拒绝 / 被重置说明服务器还没起来，静默重试。

use std::time::{Duration, Instant};

use tracing::debug;

use crate::config::Config;
use crate::error::{GradeError, GradeResult};
use crate::infrastructure::HttpClient;

/// 探测成功的信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    pub attempts: u32,
    pub elapsed: Duration,
    /// 第一个响应的状态码
    pub status: u16,
}

/// 就绪探测器
pub struct ReadinessProbe {
    path: String,
    interval: Duration,
    request_timeout: Duration,
}

impl ReadinessProbe {
    pub fn new(path: impl Into<String>, interval: Duration, request_timeout: Duration) -> Self {
        Self {
            path: path.into(),
            interval,
            request_timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.readiness_path.clone(),
            config.probe_interval(),
            config.probe_request_timeout(),
        )
    }

    /// 等待服务器就绪，超过 `timeout` 返回 `ReadinessTimeout`
    pub async fn wait(&self, base_url: &str, timeout: Duration) -> GradeResult<ProbeReport> {
        let client = HttpClient::new(base_url, self.request_timeout);
        let started = Instant::now();
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            match client.get(&self.path).await {
                Ok(reply) => {
                    let report = ProbeReport {
                        attempts,
                        elapsed: started.elapsed(),
                        status: reply.status,
                    };
                    debug!("服务器已响应: {:?}", report);
                    return Ok(report);
                }
                Err(e) if e.is_not_up_yet() => {
                    debug!("第 {} 次探测: 尚未就绪", attempts);
                }
                Err(e) => {
                    debug!("第 {} 次探测失败: {}", attempts, e);
                }
            }

            let elapsed = started.elapsed();
            if elapsed >= timeout {
                return Err(GradeError::ReadinessTimeout {
                    url: client.url(&self.path),
                    timeout_secs: timeout.as_secs(),
                    attempts,
                });
            }
            // 最后一次探测正好落在超时点上
            tokio::time::sleep(self.interval.min(timeout - elapsed)).await;
        }
    }
}
