//! 测试集层（Battery Layer）
//!
//! 定义"对一个已就绪的服务器跑一组检查"的流程。
//!
//! - 每个用例独立执行，出错只影响自己（0 分 + 诊断信息）
//! - 不持有被测进程，不计总分
//! - 编排层通过 `TestBattery` 统一调用，不区分后端 / 前端

pub mod api_battery;
pub mod cases;
pub mod ui_battery;

use async_trait::async_trait;

use crate::models::TestResult;

pub use api_battery::ApiTestBattery;
pub use cases::{ApiCheck, UiCheck, API_TEST_CASES, UI_TEST_CASES};
pub use ui_battery::UiTestBattery;

/// 测试集
#[async_trait]
pub trait TestBattery: Send + Sync {
    fn name(&self) -> &'static str;

    /// 所有用例名，按执行顺序
    fn case_names(&self) -> Vec<String>;

    /// 各用例权重之和
    fn max_score(&self) -> u32;

    /// 按顺序执行所有用例，每个用例恰好产生一个结果
    async fn run_all(&self, base_url: &str) -> Vec<TestResult>;
}

/// 单个用例的判定
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Verdict {
    pub passed: bool,
    pub details: String,
}

impl Verdict {
    pub fn pass(details: impl Into<String>) -> Self {
        Self {
            passed: true,
            details: details.into(),
        }
    }

    pub fn fail(details: impl Into<String>) -> Self {
        Self {
            passed: false,
            details: details.into(),
        }
    }
}

/// panic 信息转为字符串
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
