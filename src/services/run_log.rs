//! 运行日志写入 - 业务能力层
//!
//! 只负责往运行日志文件追加内容，不关心评分流程

use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::GradeResult;
use crate::models::GradingRecord;

/// 运行日志
///
/// 职责：
/// - 启动时写入带时间戳的文件头
/// - 每评完一个提交追加一行摘要
pub struct RunLog {
    path: PathBuf,
}

impl RunLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 创建（覆盖）日志文件并写入文件头
    pub async fn init(&self) -> GradeResult<()> {
        let header = format!(
            "{}\n评分日志 - {}\n{}\n\n",
            "=".repeat(60),
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            "=".repeat(60)
        );
        tokio::fs::write(&self.path, header).await?;
        Ok(())
    }

    /// 追加一行
    pub async fn append(&self, line: &str) -> GradeResult<()> {
        debug!("写入运行日志: {}", line);

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(format!("{}\n", line).as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// 追加一个提交的摘要
    pub async fn append_record(&self, index: usize, total: usize, record: &GradingRecord) -> GradeResult<()> {
        self.append(&format!("[提交 {}/{}] {}", index, total, record.summary_line()))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Submission;

    #[tokio::test]
    async fn test_header_then_lines() {
        let dir = tempfile::tempdir().unwrap();
        let log = RunLog::new(dir.path().join("grading_log.txt"));
        log.init().await.unwrap();

        let record = GradingRecord::zero(Submission::new("7", "Carol", "/tmp/c"), 100, "清单文件不存在");
        log.append_record(1, 2, &record).await.unwrap();

        let content = std::fs::read_to_string(log.path()).unwrap();
        assert!(content.starts_with(&"=".repeat(60)));
        assert!(content.contains("评分日志"));
        assert!(content.contains("[提交 1/2] Carol (7) | 0/100"));
    }
}
