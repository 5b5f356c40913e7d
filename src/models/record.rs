use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::grade::Grade;
use crate::models::launch::ProcessState;
use crate::models::submission::Submission;

/// 静态定义的测试用例，所有提交共用
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestCase<C> {
    pub name: &'static str,
    /// 满分
    pub weight: u32,
    pub check: C,
}

/// 单个测试用例的结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub test_name: String,
    pub passed: bool,
    /// 0 或满分
    pub points: u32,
    pub max_points: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TestResult {
    pub fn pass(name: impl Into<String>, weight: u32, details: impl Into<String>) -> Self {
        Self {
            test_name: name.into(),
            passed: true,
            points: weight,
            max_points: weight,
            details: Some(details.into()),
            error: None,
        }
    }

    pub fn fail(name: impl Into<String>, weight: u32, details: impl Into<String>) -> Self {
        Self {
            test_name: name.into(),
            passed: false,
            points: 0,
            max_points: weight,
            details: Some(details.into()),
            error: None,
        }
    }

    /// 执行过程中出错（网络错误、异常响应等）
    pub fn errored(name: impl Into<String>, weight: u32, error: impl Into<String>) -> Self {
        Self {
            test_name: name.into(),
            passed: false,
            points: 0,
            max_points: weight,
            details: None,
            error: Some(error.into()),
        }
    }

    /// 根据判定结果构造
    pub fn from_verdict(name: impl Into<String>, weight: u32, passed: bool, details: impl Into<String>) -> Self {
        if passed {
            Self::pass(name, weight, details)
        } else {
            Self::fail(name, weight, details)
        }
    }
}

/// 一个提交的完整评分记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingRecord {
    pub submission: Submission,
    pub server_started: bool,
    pub tests: Vec<TestResult>,
    /// 从未执行的测试（服务器未就绪）
    #[serde(default)]
    pub skipped_tests: Vec<String>,
    pub errors: Vec<String>,
    /// 启动失败时保留的服务器输出末尾
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub server_output: Vec<String>,
    #[serde(default)]
    pub process_lifecycle: Vec<ProcessState>,
    pub total_score: u32,
    pub max_score: u32,
    pub percentage: f64,
    pub grade: Grade,
    pub timestamp: DateTime<Utc>,
}

impl GradingRecord {
    /// 新建空记录，得分为 0
    pub fn new(submission: Submission, max_score: u32) -> Self {
        Self {
            submission,
            server_started: false,
            tests: Vec::new(),
            skipped_tests: Vec::new(),
            errors: Vec::new(),
            server_output: Vec::new(),
            process_lifecycle: Vec::new(),
            total_score: 0,
            max_score,
            percentage: 0.0,
            grade: Grade::F,
            timestamp: Utc::now(),
        }
    }

    /// 带错误信息的零分记录
    pub fn zero(submission: Submission, max_score: u32, error: impl Into<String>) -> Self {
        let mut record = Self::new(submission, max_score);
        record.errors.push(error.into());
        record
    }

    /// 各测试得分之和
    pub fn points_sum(&self) -> u32 {
        self.tests.iter().map(|t| t.points).sum()
    }

    /// 总分 = 各测试得分之和 ≤ 满分
    pub fn is_consistent(&self) -> bool {
        self.points_sum() == self.total_score && self.total_score <= self.max_score
    }

    /// 一行摘要，用于运行日志
    pub fn summary_line(&self) -> String {
        format!(
            "{} | {}/{} ({:.1}%) {} | 服务器: {} | 错误: {}",
            self.submission,
            self.total_score,
            self.max_score,
            self.percentage,
            self.grade,
            if self.server_started { "已启动" } else { "未启动" },
            if self.errors.is_empty() {
                "无".to_string()
            } else {
                self.errors.join("; ")
            }
        )
    }
}
