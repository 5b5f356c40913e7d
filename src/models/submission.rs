use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// 一份待评分的提交
///
/// 由名单加载阶段创建，之后不再修改
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub id: String,
    pub name: String,
    /// 仓库在本地的目录
    #[serde(alias = "source_dir")]
    pub source_dir: PathBuf,
    /// 仓库地址（仅用于报告）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
}

impl Submission {
    pub fn new(id: impl Into<String>, name: impl Into<String>, source_dir: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            source_dir: source_dir.into(),
            repository: None,
        }
    }

    pub fn with_repository(mut self, repository: impl Into<String>) -> Self {
        self.repository = Some(repository.into());
        self
    }

    /// 服务端目录 = 仓库目录 / server_subdir
    pub fn server_dir(&self, server_subdir: &str) -> PathBuf {
        if server_subdir.is_empty() {
            self.source_dir.clone()
        } else {
            self.source_dir.join(server_subdir)
        }
    }

    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }
}

impl std::fmt::Display for Submission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}
