//! 单个提交评分器 - 编排层
//!
//! ## 流程
//!
//! 1. **结构检查**：仓库目录、服务端目录、清单文件，缺失直接零分
//! 2. **入口解析**：确定启动命令
//! 3. **启动前检查**：端口必须空闲，被占用时先回收
//! 4. **启动 + 就绪探测**：失败则记录启动 0 分，所有测试跳过
//! 5. **执行测试集**：就绪后等待稳定，再依次执行
//! 6. **清理**：无论成功失败都执行，最后计分
//!
//! 持有的 supervisor 在返回前一定走到 Terminated。

use std::path::PathBuf;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::battery::TestBattery;
use crate::config::Config;
use crate::error::{GradeError, GradeResult};
use crate::infrastructure::{PortReclaimer, ProcessSupervisor};
use crate::models::{GradingRecord, LaunchSpec, Submission, TestResult};
use crate::services::{EntryPointResolver, ReadinessProbe, ScoreAggregator, STARTUP_TEST_NAME, STARTUP_WEIGHT};
use crate::utils::logging::truncate_text;

/// 启动失败时保留的输出行数
const SERVER_OUTPUT_TAIL: usize = 30;

/// 单个提交评分器
pub struct SubmissionGrader {
    config: Config,
    batteries: Vec<Box<dyn TestBattery>>,
    resolver: EntryPointResolver,
    probe: ReadinessProbe,
    reclaimer: PortReclaimer,
    aggregator: ScoreAggregator,
}

impl SubmissionGrader {
    pub fn new(config: Config, batteries: Vec<Box<dyn TestBattery>>, reclaimer: PortReclaimer) -> GradeResult<Self> {
        let aggregator = ScoreAggregator::for_batteries(batteries.iter().map(|b| b.max_score()));
        Ok(Self {
            resolver: EntryPointResolver::from_config(&config)?,
            probe: ReadinessProbe::from_config(&config),
            config,
            batteries,
            reclaimer,
            aggregator,
        })
    }

    pub fn max_score(&self) -> u32 {
        self.aggregator.max_score()
    }

    pub fn reclaimer(&self) -> &PortReclaimer {
        &self.reclaimer
    }

    /// 所有测试集的用例名
    fn all_case_names(&self) -> Vec<String> {
        self.batteries.iter().flat_map(|b| b.case_names()).collect()
    }

    /// 评分一个提交，任何失败都体现在记录里，不会返回错误
    pub async fn grade(&self, submission: &Submission, index: usize, total: usize) -> GradingRecord {
        let tag = format!("提交 {}/{}", index, total);
        info!("[{}] 📄 开始评分: {}", tag, submission);

        let mut record = GradingRecord::new(submission.clone(), self.max_score());

        // ========== 结构检查 + 入口解析 ==========
        let spec = match self.prepare(submission) {
            Ok(spec) => spec,
            Err(e) => {
                if e.is_structural() {
                    warn!("[{}] ❌ 结构检查未通过: {}", tag, e);
                } else {
                    error!("[{}] ❌ 准备阶段出错: {}", tag, e);
                }
                record.errors.push(e.to_string());
                self.finalize(&mut record);
                return record;
            }
        };

        // ========== 启动前确认端口空闲 ==========
        if let Err(e) = self.reclaimer.ensure_free(spec.port).await {
            warn!("[{}] ⚠️ 启动前端口仍被占用: {}", tag, e);
            record.errors.push(e.to_string());
        }

        let mut supervisor = ProcessSupervisor::new(
            tag.clone(),
            self.reclaimer.clone(),
            self.config.kill_grace(),
            self.config.log_sink_capacity,
        );

        self.run_server(&tag, &spec, &mut supervisor, &mut record).await;

        // ========== 清理（必须执行） ==========
        let mut teardown = supervisor.stop().await;
        if !record.server_started {
            let output = std::mem::take(&mut teardown.output);
            let skip = output.len().saturating_sub(SERVER_OUTPUT_TAIL);
            record.server_output = output.into_iter().skip(skip).collect();
        }
        if !teardown.port_released() {
            record.errors.push(
                teardown
                    .reclaim_error
                    .unwrap_or_else(|| format!("端口 {} 未确认释放", spec.port)),
            );
        }
        record.process_lifecycle = supervisor.history().to_vec();

        self.finalize(&mut record);
        info!(
            "[{}] ✓ 完成: {}/{} ({:.1}%) {}",
            tag, record.total_score, record.max_score, record.percentage, record.grade
        );
        record
    }

    /// 结构检查并解析启动命令
    fn prepare(&self, submission: &Submission) -> GradeResult<LaunchSpec> {
        if !submission.source_dir().is_dir() {
            return Err(GradeError::MissingSourceDirectory {
                path: submission.source_dir.clone(),
            });
        }

        let server_dir = submission.server_dir(&self.config.server_subdir);
        if !server_dir.is_dir() {
            return Err(GradeError::MissingServerDirectory { path: server_dir });
        }

        let manifest: PathBuf = server_dir.join(&self.config.manifest_file);
        if !manifest.is_file() {
            return Err(GradeError::MissingManifest { path: manifest });
        }

        self.resolver.resolve(&server_dir)
    }

    /// 启动 → 就绪 → 测试，结果写入记录
    async fn run_server(
        &self,
        tag: &str,
        spec: &LaunchSpec,
        supervisor: &mut ProcessSupervisor,
        record: &mut GradingRecord,
    ) {
        if let Err(e) = supervisor.start(spec) {
            if e.is_launch_failure() {
                error!("[{}] ❌ {}", tag, e);
            } else {
                error!("[{}] ❌ 启动前状态异常: {}", tag, e);
            }
            self.record_launch_failure(record, &e);
            return;
        }

        let base_url = self.config.base_url();
        info!("[{}] ⏳ 等待服务器就绪: {}{}", tag, base_url, self.config.readiness_path);

        let ready = match self.probe.wait(&base_url, self.config.startup_timeout()).await {
            Ok(ready) => ready,
            Err(e) => {
                error!("[{}] ❌ {}", tag, e);
                for line in supervisor.log_tail(5) {
                    warn!("[{}]    {}", tag, truncate_text(&line, 160));
                }
                note(record, supervisor.mark_failed());
                self.record_launch_failure(record, &e);
                return;
            }
        };

        note(record, supervisor.mark_ready());
        record.server_started = true;
        record.tests.push(TestResult::pass(
            STARTUP_TEST_NAME,
            STARTUP_WEIGHT,
            format!(
                "✓ 服务器在 {:.1}s 内就绪 (第 {} 次探测, 状态码 {})",
                ready.elapsed.as_secs_f64(),
                ready.attempts,
                ready.status
            ),
        ));
        info!("[{}] ✅ 服务器已就绪", tag);

        tokio::time::sleep(self.config.stabilize_delay()).await;
        note(record, supervisor.mark_testing());

        for battery in &self.batteries {
            info!("[{}] 🧪 执行测试集: {}", tag, battery.name());
            let results = battery.run_all(&base_url).await;
            let passed = results.iter().filter(|r| r.passed).count();
            info!("[{}] 测试集 {} 完成: 通过 {}/{}", tag, battery.name(), passed, results.len());
            record.tests.extend(results);
        }
    }

    /// 启动失败：启动分为 0，所有测试标记为跳过
    fn record_launch_failure(&self, record: &mut GradingRecord, error: &GradeError) {
        record.server_started = false;
        record.tests.push(TestResult::errored(STARTUP_TEST_NAME, STARTUP_WEIGHT, error.to_string()));
        record.errors.push(error.to_string());
        record.skipped_tests = self.all_case_names();
    }

    fn finalize(&self, record: &mut GradingRecord) {
        let summary = self.aggregator.compute(&record.tests);
        record.total_score = summary.total_score;
        record.max_score = summary.max_score;
        record.percentage = summary.percentage;
        record.grade = summary.grade;
        record.timestamp = Utc::now();
    }
}

/// 状态机错误只记录，不影响评分
fn note(record: &mut GradingRecord, result: GradeResult<()>) {
    if let Err(e) = result {
        warn!("{}", e);
        record.errors.push(e.to_string());
    }
}
