//! 批量评分编排器 - 编排层
//!
//! ## 职责
//!
//! 1. **顺序评分**：一个提交完全清理后才开始下一个
//! 2. **故障隔离**：单个提交 panic 只影响它自己的记录
//! 3. **增量保存**：每个提交完成后立即保存累计结果（失败重试）
//! 4. **续评**：可跳过结果文件中已有的提交
//! 5. **节奏控制**：两个提交之间冷却，让端口和句柄释放
//! 6. **全局统计**：结束时输出汇总

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures::FutureExt;
use tracing::{error, info, warn};

use crate::battery::{panic_message, ApiTestBattery, TestBattery, UiTestBattery};
use crate::config::Config;
use crate::error::GradeResult;
use crate::infrastructure::{platform_terminator, PortReclaimer, ProcessGroupTerminator};
use crate::models::loaders::roster_loader::ensure_unique_ids;
use crate::models::{GradingRecord, Submission, SummaryStats};
use crate::orchestrator::submission_grader::SubmissionGrader;
use crate::services::{JsonFileStore, RecordSink, RunLog};
use crate::utils::logging;

/// 保存失败后的重试次数
const PERSIST_ATTEMPTS: u32 = 3;
const PERSIST_BACKOFF: Duration = Duration::from_millis(200);

/// 批量评分编排器
pub struct GradingOrchestrator {
    config: Config,
    grader: SubmissionGrader,
    sink: Box<dyn RecordSink>,
    run_log: Option<RunLog>,
}

impl GradingOrchestrator {
    pub fn new(
        config: Config,
        batteries: Vec<Box<dyn TestBattery>>,
        sink: Box<dyn RecordSink>,
        terminator: Arc<dyn ProcessGroupTerminator>,
    ) -> GradeResult<Self> {
        let grader = SubmissionGrader::new(config.clone(), batteries, PortReclaimer::new(terminator))?;
        Ok(Self {
            config,
            grader,
            sink,
            run_log: None,
        })
    }

    /// 按配置组装：后端测试集必选，前端测试集可选；结果写入 JSON 文件
    pub fn from_config(config: Config) -> GradeResult<Self> {
        let mut batteries: Vec<Box<dyn TestBattery>> = vec![Box::new(ApiTestBattery::from_config(&config))];
        if config.enable_ui_battery {
            batteries.push(Box::new(UiTestBattery::from_config(&config)));
        }
        let sink = Box::new(JsonFileStore::new(&config.results_file));
        let run_log = RunLog::new(&config.output_log_file);

        Ok(Self::new(config, batteries, sink, platform_terminator())?.with_run_log(run_log))
    }

    pub fn with_run_log(mut self, run_log: RunLog) -> Self {
        self.run_log = Some(run_log);
        self
    }

    pub fn max_score(&self) -> u32 {
        self.grader.max_score()
    }

    /// 评分所有提交
    ///
    /// 只有名单级别的问题（重复 id、续评时结果文件损坏）才返回错误
    pub async fn grade_all(&self, submissions: &[Submission]) -> Result<Vec<GradingRecord>> {
        ensure_unique_ids(submissions)?;

        let mut records = if self.config.resume {
            self.sink.load().await?
        } else {
            Vec::new()
        };
        let done: HashSet<String> = records.iter().map(|r| r.submission.id.clone()).collect();
        let pending: Vec<&Submission> = submissions.iter().filter(|s| !done.contains(&s.id)).collect();

        if !done.is_empty() {
            info!(
                "♻️ 续评: 已有 {} 条记录，跳过 {} 个提交",
                records.len(),
                submissions.len() - pending.len()
            );
        }
        logging::log_submissions_loaded(pending.len(), self.max_score());

        let total = pending.len();
        for (i, submission) in pending.into_iter().enumerate() {
            let index = i + 1;
            logging::log_submission_start(index, total, submission);

            let record = match AssertUnwindSafe(self.grader.grade(submission, index, total))
                .catch_unwind()
                .await
            {
                Ok(record) => record,
                Err(panic) => self.recover_from_panic(submission, index, total, panic.as_ref()).await,
            };

            if let Some(run_log) = &self.run_log {
                if let Err(e) = run_log.append_record(index, total, &record).await {
                    warn!("写入运行日志失败: {}", e);
                }
            }

            records.push(record);
            self.persist_with_retry(&records).await;

            if index < total && !self.config.cooldown().is_zero() {
                tokio::time::sleep(self.config.cooldown()).await;
            }
        }

        let stats = SummaryStats::from_records(&records);
        logging::print_final_stats(&stats, &self.config.output_log_file);

        Ok(records)
    }

    /// panic 之后生成零分记录，并确保端口被释放
    async fn recover_from_panic(
        &self,
        submission: &Submission,
        index: usize,
        total: usize,
        panic: &(dyn std::any::Any + Send),
    ) -> GradingRecord {
        let message = panic_message(panic);
        error!("[提交 {}/{}] 💥 评分过程异常: {}", index, total, message);

        if let Err(e) = self.grader.reclaimer().reclaim(self.config.port).await {
            warn!("[提交 {}/{}] ⚠️ {}", index, total, e);
        }

        GradingRecord::zero(
            submission.clone(),
            self.max_score(),
            format!("评分过程异常: {}", message),
        )
    }

    /// 保存累计结果，失败时按退避重试，最终失败只记录日志
    async fn persist_with_retry(&self, records: &[GradingRecord]) -> bool {
        for attempt in 1..=PERSIST_ATTEMPTS {
            match self.sink.persist(records).await {
                Ok(()) => return true,
                Err(e) => {
                    warn!("💾 保存结果失败 (第 {}/{} 次): {}", attempt, PERSIST_ATTEMPTS, e);
                    if attempt < PERSIST_ATTEMPTS {
                        tokio::time::sleep(PERSIST_BACKOFF * 2u32.pow(attempt - 1)).await;
                    }
                }
            }
        }
        error!("❌ 结果保存失败，已放弃，继续评分");
        false
    }
}
