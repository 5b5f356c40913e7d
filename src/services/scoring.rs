//! 计分 - 业务能力层

use serde::Serialize;

use crate::models::{Grade, TestResult};

/// "服务器启动"本身的分值
pub const STARTUP_WEIGHT: u32 = 5;
/// 启动测试的名称，永远是记录中的第一个测试
pub const STARTUP_TEST_NAME: &str = "Server Startup";

/// 计分结果
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreSummary {
    pub total_score: u32,
    pub max_score: u32,
    pub percentage: f64,
    pub grade: Grade,
}

/// 计分器
///
/// 满分在创建时固定（启动分 + 各测试集权重之和），与测试是否真正执行无关
#[derive(Debug, Clone, Copy)]
pub struct ScoreAggregator {
    max_score: u32,
}

impl ScoreAggregator {
    pub fn new(max_score: u32) -> Self {
        Self { max_score }
    }

    /// 启动分 + 各测试集的满分
    pub fn for_batteries(battery_max_scores: impl IntoIterator<Item = u32>) -> Self {
        Self::new(STARTUP_WEIGHT + battery_max_scores.into_iter().sum::<u32>())
    }

    pub fn max_score(&self) -> u32 {
        self.max_score
    }

    pub fn compute(&self, results: &[TestResult]) -> ScoreSummary {
        let total_score = results.iter().map(|r| r.points).sum::<u32>();
        let percentage = percentage(total_score, self.max_score);
        ScoreSummary {
            total_score,
            max_score: self.max_score,
            percentage,
            grade: Grade::from_percentage(percentage),
        }
    }
}

/// 保留一位小数
fn percentage(total: u32, max: u32) -> f64 {
    if max == 0 {
        return 0.0;
    }
    (total as f64 / max as f64 * 1000.0).round() / 10.0
}
