//! 应用入口 - 编排层
//!
//! 初始化运行日志、加载名单、交给 `GradingOrchestrator` 评分

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::config::Config;
use crate::models::{discover_submissions, load_roster, GradingRecord, Submission};
use crate::orchestrator::GradingOrchestrator;
use crate::services::RunLog;
use crate::utils::logging;

/// 应用主结构
pub struct App {
    orchestrator: GradingOrchestrator,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        RunLog::new(&config.output_log_file)
            .init()
            .await
            .with_context(|| format!("无法创建运行日志 {}", config.output_log_file))?;

        let orchestrator = GradingOrchestrator::from_config(config.clone())?;
        logging::log_startup(&config, orchestrator.max_score());

        Ok(Self { orchestrator })
    }

    /// 加载提交并评分
    ///
    /// `source` 是 TOML 名单文件，或每个子目录一个提交的文件夹
    pub async fn run(&self, source: &Path) -> Result<Vec<GradingRecord>> {
        let submissions = load_submissions(source).await?;
        if submissions.is_empty() {
            warn!("⚠️ 没有找到待评分的提交，程序结束");
            return Ok(Vec::new());
        }

        self.orchestrator.grade_all(&submissions).await
    }
}

async fn load_submissions(source: &Path) -> Result<Vec<Submission>> {
    info!("\n📁 正在加载提交: {}", source.display());
    let submissions = if source.is_dir() {
        discover_submissions(source).await?
    } else {
        load_roster(source).await?
    };
    Ok(submissions)
}
