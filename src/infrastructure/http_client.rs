//! HTTP 客户端 - 基础设施层
//!
//! 任何 HTTP 状态码都是正常返回值，只有网络层失败才是错误。
//! 调用方自己检查 `status`，而不是依赖异常分支。

use std::time::Duration;

use serde_json::Value as JsonValue;

/// 一次 HTTP 响应
#[derive(Debug, Clone, PartialEq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    /// 尝试把响应体解析为 JSON
    pub fn json(&self) -> Option<JsonValue> {
        serde_json::from_str(&self.body).ok()
    }
}

/// 网络层失败
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NetworkError {
    /// 连接被拒绝（服务器尚未监听）
    #[error("连接被拒绝")]
    ConnectionRefused,
    /// 连接被重置（服务器崩溃或中途关闭）
    #[error("连接被重置")]
    ConnectionReset,
    /// 请求超时
    #[error("请求超时")]
    Timeout,
    /// 其他错误
    #[error("{0}")]
    Other(String),
}

impl NetworkError {
    /// 服务器还没起来的典型表现
    pub fn is_not_up_yet(&self) -> bool {
        matches!(self, NetworkError::ConnectionRefused | NetworkError::ConnectionReset)
    }

    fn classify(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            return NetworkError::Timeout;
        }

        let mut source = std::error::Error::source(err);
        while let Some(cause) = source {
            if let Some(io) = cause.downcast_ref::<std::io::Error>() {
                match io.kind() {
                    std::io::ErrorKind::ConnectionRefused => return NetworkError::ConnectionRefused,
                    std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::UnexpectedEof => return NetworkError::ConnectionReset,
                    _ => {}
                }
            }
            source = cause.source();
        }

        if err.is_connect() {
            NetworkError::ConnectionRefused
        } else {
            NetworkError::Other(err.to_string())
        }
    }
}

/// HTTP 请求结果
pub type HttpOutcome = Result<HttpReply, NetworkError>;

/// 面向被测服务器的 HTTP 客户端
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        // 构建失败时退回默认客户端，每个请求仍然单独设置超时
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn get(&self, path: &str) -> HttpOutcome {
        let request = self.client.get(self.url(path)).timeout(self.timeout);
        Self::send(request).await
    }

    pub async fn post_json(&self, path: &str, body: &JsonValue) -> HttpOutcome {
        let request = self.client.post(self.url(path)).timeout(self.timeout).json(body);
        Self::send(request).await
    }

    async fn send(request: reqwest::RequestBuilder) -> HttpOutcome {
        let response = request.send().await.map_err(|e| NetworkError::classify(&e))?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| NetworkError::classify(&e))?;
        Ok(HttpReply { status, body })
    }
}
