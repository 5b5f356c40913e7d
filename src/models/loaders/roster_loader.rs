use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tokio::fs;

use crate::error::{GradeError, GradeResult};
use crate::models::submission::Submission;

/// TOML 名单文件结构
#[derive(Debug, Deserialize)]
struct RosterFile {
    #[serde(default)]
    submissions: Vec<Submission>,
}

/// 从 TOML 名单文件加载提交列表
///
/// ```toml
/// [[submissions]]
/// id = "2024001"
/// name = "Alice Martin"
/// source_dir = "students/alice-recipes"
/// repository = "https://github.com/alice/recipes"
/// ```
///
/// 相对路径以名单文件所在目录为基准
pub async fn load_roster(roster_path: &Path) -> GradeResult<Vec<Submission>> {
    let content = fs::read_to_string(roster_path).await.map_err(|e| {
        GradeError::Roster(format!("无法读取名单文件 {}: {}", roster_path.display(), e))
    })?;

    let roster: RosterFile = toml::from_str(&content).map_err(|e| {
        GradeError::Roster(format!("无法解析名单文件 {}: {}", roster_path.display(), e))
    })?;

    let base_dir = roster_path.parent().unwrap_or_else(|| Path::new("."));
    let submissions: Vec<Submission> = roster
        .submissions
        .into_iter()
        .map(|mut s| {
            if s.source_dir.is_relative() {
                s.source_dir = base_dir.join(&s.source_dir);
            }
            s
        })
        .collect();

    ensure_unique_ids(&submissions)?;
    tracing::info!("✓ 名单加载完成: {} 个提交", submissions.len());

    Ok(submissions)
}

/// 扫描目录：每个子目录是一个提交，目录名同时作为 id 和名称
pub async fn discover_submissions(folder_path: &Path) -> GradeResult<Vec<Submission>> {
    if !folder_path.exists() {
        return Err(GradeError::Roster(format!(
            "文件夹不存在: {}",
            folder_path.display()
        )));
    }

    let mut dirs: Vec<PathBuf> = Vec::new();
    let mut entries = fs::read_dir(folder_path).await.map_err(|e| {
        GradeError::Roster(format!("无法读取文件夹 {}: {}", folder_path.display(), e))
    })?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if entry.file_type().await?.is_dir() {
            dirs.push(path);
        }
    }

    // 目录遍历顺序不稳定，按名称排序保证评分顺序可复现
    dirs.sort();

    let submissions = dirs
        .into_iter()
        .map(|path| {
            let name = path
                .file_name()
                .unwrap_or_default()
                .to_string_lossy()
                .to_string();
            tracing::info!("正在加载: {}", name);
            Submission::new(name.clone(), name, path)
        })
        .collect::<Vec<_>>();

    if submissions.is_empty() {
        tracing::warn!("在文件夹 {} 中没有找到提交", folder_path.display());
    }

    Ok(submissions)
}

/// 名单中的 id 必须唯一
pub fn ensure_unique_ids(submissions: &[Submission]) -> GradeResult<()> {
    let mut seen = HashSet::new();
    for submission in submissions {
        if !seen.insert(submission.id.as_str()) {
            return Err(GradeError::Roster(format!("重复的提交 id: {}", submission.id)));
        }
    }
    Ok(())
}
