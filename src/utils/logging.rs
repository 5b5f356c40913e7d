//! 日志工具模块
//!
//! 提供日志初始化和格式化输出的辅助函数

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::models::{Submission, SummaryStats};

/// 初始化 tracing
///
/// 优先使用 `RUST_LOG`，否则按 `verbose` 选择 debug / info
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // 测试中可能被多次调用，重复初始化直接忽略
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 记录程序启动信息
pub fn log_startup(config: &Config, max_score: u32) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 顺序评分模式");
    info!("🌐 被测地址: {}", config.base_url());
    info!("⏱️ 启动超时: {} 秒", config.startup_timeout_secs);
    info!("📊 满分: {}", max_score);
    info!("{}", "=".repeat(60));
}

/// 记录提交加载信息
pub fn log_submissions_loaded(total: usize, max_score: u32) {
    info!("✓ 找到 {} 个待评分的提交", total);
    info!("📋 每个提交满分 {}，逐个评分", max_score);
    info!("💡 一个提交完全清理后才开始下一个\n");
}

/// 记录单个提交开始
pub fn log_submission_start(index: usize, total: usize, submission: &Submission) {
    info!("\n{}", "=".repeat(60));
    info!("📦 第 {}/{} 个提交: {}", index, total, submission);
    if let Some(repository) = &submission.repository {
        info!("🔗 仓库: {}", repository);
    }
    info!("{}", "=".repeat(60));
}

/// 打印最终统计信息
pub fn print_final_stats(stats: &SummaryStats, log_file_path: &str) {
    info!("\n{}", "=".repeat(60));
    info!("📊 全部评分完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("📄 提交总数: {}", stats.total_submissions);
    info!("📈 平均分: {} ({}%)", stats.average_score, stats.average_percentage);
    info!("🔝 最高分: {} / 最低分: {}", stats.highest_score, stats.lowest_score);
    info!("✅ 及格: {}", stats.passed_count);
    info!("❌ 不及格: {}", stats.failed_count);
    info!("💯 满分: {}", stats.perfect_scores);
    info!("🛑 服务器启动失败: {}", stats.server_start_failures);
    info!("{}", "=".repeat(60));
    info!("\n日志已保存至: {}", log_file_path);
}

/// 截断长文本用于日志显示
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
