//! 结果持久化 - 业务能力层
//!
//! 每评完一个提交就把累计的记录整体写出，先写临时文件再改名，
//! 中途崩溃不会留下半个 JSON 文件。

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::error::{GradeError, GradeResult};
use crate::models::GradingRecord;

/// 持久化接收方
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// 覆盖写入当前累计的全部记录
    async fn persist(&self, records: &[GradingRecord]) -> GradeResult<()>;

    /// 读取之前保存的记录，不存在时返回空列表
    async fn load(&self) -> GradeResult<Vec<GradingRecord>>;
}

/// JSON 文件存储
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl RecordSink for JsonFileStore {
    async fn persist(&self, records: &[GradingRecord]) -> GradeResult<()> {
        let json = serde_json::to_string_pretty(records)
            .map_err(|e| GradeError::persistence(&self.path, e))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| GradeError::persistence(&self.path, e))?;
        }

        let temp = self.temp_path();
        tokio::fs::write(&temp, json)
            .await
            .map_err(|e| GradeError::persistence(&temp, e))?;
        tokio::fs::rename(&temp, &self.path)
            .await
            .map_err(|e| GradeError::persistence(&self.path, e))?;

        debug!("💾 已保存 {} 条记录到 {}", records.len(), self.path.display());
        Ok(())
    }

    async fn load(&self) -> GradeResult<Vec<GradingRecord>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(GradeError::persistence(&self.path, e)),
        };
        serde_json::from_str(&content).map_err(|e| GradeError::persistence(&self.path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Submission;

    #[test]
    fn test_persist_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("out/results.json"));
        let records = vec![
            GradingRecord::zero(Submission::new("1", "Alice", "/tmp/a"), 100, "服务端目录不存在"),
            GradingRecord::new(Submission::new("2", "Bob", "/tmp/b"), 100),
        ];

        tokio_test::block_on(store.persist(&records)).unwrap();
        let loaded = tokio_test::block_on(store.load()).unwrap();

        assert_eq!(loaded, records);
        assert!(!store.temp_path().exists());
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("absent.json"));
        assert!(tokio_test::block_on(store.load()).unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_file_is_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");
        std::fs::write(&path, "[{not json").unwrap();

        let err = tokio_test::block_on(JsonFileStore::new(&path).load()).unwrap_err();
        assert!(matches!(err, GradeError::Persistence { .. }));
    }
}
