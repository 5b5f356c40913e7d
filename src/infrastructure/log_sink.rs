//! 有界日志接收器 - 基础设施层
//!
//! 收集被测进程的 stdout / stderr，只保留最近的若干行。
//! 读取任务由 supervisor 持有，在清理阶段停止并取走内容，不参与控制流。

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// 需要立即提示的输出关键字
const ALERT_PATTERNS: &[&str] = &["EADDRINUSE", "Cannot find module"];

#[derive(Debug, Default)]
struct Buffer {
    lines: VecDeque<String>,
    dropped: usize,
}

/// 环形日志缓冲
#[derive(Clone)]
pub struct LogSink {
    buffer: Arc<Mutex<Buffer>>,
    capacity: usize,
    label: String,
}

impl LogSink {
    pub fn new(label: impl Into<String>, capacity: usize) -> Self {
        Self {
            buffer: Arc::new(Mutex::new(Buffer::default())),
            capacity: capacity.max(1),
            label: label.into(),
        }
    }

    /// 写入一行，超出容量时丢弃最旧的一行
    pub fn push(&self, line: impl Into<String>) {
        let line = line.into();
        if ALERT_PATTERNS.iter().any(|p| line.contains(p)) {
            warn!("[{}] ⚠️ 服务器输出: {}", self.label, line.trim());
        } else {
            debug!("[{}] {}", self.label, line.trim_end());
        }

        let Ok(mut buffer) = self.buffer.lock() else {
            return;
        };
        if buffer.lines.len() == self.capacity {
            buffer.lines.pop_front();
            buffer.dropped += 1;
        }
        buffer.lines.push_back(line);
    }

    /// 启动后台任务逐行读取输出流
    pub fn attach<R>(&self, stream: R) -> JoinHandle<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let sink = self.clone();
        tokio::spawn(async move {
            let mut reader = BufReader::new(stream);
            let mut chunk = Vec::new();
            // 非 UTF-8 字节按替换字符保留，只有 EOF 或读错误才停止，否则管道会被提前关闭
            loop {
                chunk.clear();
                match reader.read_until(b'\n', &mut chunk).await {
                    Ok(0) => break,
                    Ok(_) => sink.push(decode_line(&chunk)),
                    Err(e) => {
                        debug!("[{}] 停止读取输出: {}", sink.label, e);
                        break;
                    }
                }
            }
        })
    }

    /// 取走当前所有行
    pub fn drain(&self) -> Vec<String> {
        match self.buffer.lock() {
            Ok(mut buffer) => buffer.lines.drain(..).collect(),
            Err(_) => Vec::new(),
        }
    }

    /// 最近 n 行（不取走）
    pub fn tail(&self, n: usize) -> Vec<String> {
        match self.buffer.lock() {
            Ok(buffer) => {
                let skip = buffer.lines.len().saturating_sub(n);
                buffer.lines.iter().skip(skip).cloned().collect()
            }
            Err(_) => Vec::new(),
        }
    }

    /// 因容量限制丢弃的行数
    pub fn dropped(&self) -> usize {
        self.buffer.lock().map(|b| b.dropped).unwrap_or(0)
    }
}

/// 去掉行尾换行，无效字节替换为 U+FFFD
fn decode_line(chunk: &[u8]) -> String {
    let line = chunk.strip_suffix(b"\n").unwrap_or(chunk);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_is_bounded() {
        let sink = LogSink::new("test", 3);
        for i in 0..5 {
            sink.push(format!("line {}", i));
        }

        assert_eq!(sink.tail(10), vec!["line 2", "line 3", "line 4"]);
        assert_eq!(sink.dropped(), 2);
        assert_eq!(sink.drain().len(), 3);
        assert!(sink.drain().is_empty());
    }

    #[tokio::test]
    async fn test_attach_reads_stream_lines() {
        let sink = LogSink::new("test", 10);
        let input: &[u8] = b"Server listening on port 3000\nError: listen EADDRINUSE\n";
        sink.attach(input).await.unwrap();

        let lines = sink.drain();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains("EADDRINUSE"));
    }

    #[tokio::test]
    async fn test_invalid_utf8_does_not_stop_reading() {
        let sink = LogSink::new("test", 10);
        let input: &[u8] = b"caf\xe9\r\nafter-1\nafter-2";
        sink.attach(input).await.unwrap();

        assert_eq!(sink.drain(), vec!["caf\u{fffd}", "after-1", "after-2"]);
    }
}
