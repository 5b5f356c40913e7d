//! 前端页面测试集 - 测试集层
//!
//! 打开前端页面，检查它是否真正调用了被测后端并渲染出数据。
//! 浏览器相关的失败只会让用例失败，不会中断评分。

use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::Browser;
use serde::Deserialize;
use tracing::{info, warn};

use crate::battery::cases::{case_names, total_weight, UiCheck, UI_TEST_CASES};
use crate::battery::{TestBattery, Verdict};
use crate::browser;
use crate::config::Config;
use crate::error::GradeResult;
use crate::infrastructure::JsExecutor;
use crate::models::TestResult;

/// 页面加载后等待脚本请求数据的时间
const RENDER_SETTLE: Duration = Duration::from_secs(2);

/// 第一张卡片的内容
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CardProbe {
    found: bool,
    has_title: bool,
    title_text: Option<String>,
    has_ingredients: bool,
    has_button: bool,
}

/// 前端页面测试集
pub struct UiTestBattery {
    frontend_url: String,
    executable: Option<String>,
    debug_port: Option<u16>,
}

impl UiTestBattery {
    pub fn new(frontend_url: impl Into<String>, executable: Option<String>, debug_port: Option<u16>) -> Self {
        Self {
            frontend_url: frontend_url.into(),
            executable,
            debug_port,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.frontend_url.clone(),
            config.browser_executable.clone(),
            config.browser_debug_port,
        )
    }

    /// 有调试端口时连接现有浏览器，否则启动无头浏览器
    async fn open_page(&self) -> GradeResult<(Browser, JsExecutor, bool)> {
        match self.debug_port {
            Some(port) => {
                let (browser, page) = browser::connect_to_browser_and_page(port).await?;
                let executor = JsExecutor::new(page);
                executor.goto(&self.frontend_url).await?;
                Ok((browser, executor, false))
            }
            None => {
                let (browser, page) =
                    browser::launch_headless_browser(&self.frontend_url, self.executable.as_deref()).await?;
                Ok((browser, JsExecutor::new(page), true))
            }
        }
    }

    async fn run_check(&self, executor: &JsExecutor, check: UiCheck, base_url: &str) -> GradeResult<Verdict> {
        match check {
            UiCheck::FetchesRecipes => {
                let script = format!(
                    "performance.getEntriesByType('resource').filter(e => e.name.startsWith({:?})).length",
                    format!("{}/api/recipes", base_url)
                );
                let calls: u64 = executor.eval_as(script).await?;
                Ok(if calls > 0 {
                    Verdict::pass(format!("✓ 页面请求了 {}/api/recipes", base_url))
                } else {
                    Verdict::fail(format!("✗ 页面没有请求 {}/api/recipes", base_url))
                })
            }
            UiCheck::RendersCards => {
                let cards: u64 = executor
                    .eval_as("document.querySelectorAll('.card').length")
                    .await?;
                Ok(if cards > 0 {
                    Verdict::pass(format!("✓ 渲染了 {} 张菜谱卡片", cards))
                } else {
                    Verdict::fail("✗ 没有找到 .card 元素")
                })
            }
            UiCheck::ShowsDynamicData => {
                let card: CardProbe = executor.eval_as(FIRST_CARD_SCRIPT).await?;
                Ok(if !card.found {
                    Verdict::fail("✗ 没有卡片")
                } else if card.has_title && card.has_ingredients && card.has_button {
                    Verdict::pass(format!("✓ 第一张卡片: \"{}\"", card.title_text.unwrap_or_default()))
                } else {
                    Verdict::fail(format!(
                        "✗ 卡片数据不完整 (标题: {}, 配料: {}, 详情链接: {})",
                        card.has_title, card.has_ingredients, card.has_button
                    ))
                })
            }
        }
    }
}

const FIRST_CARD_SCRIPT: &str = r#"(() => {
    const card = document.querySelector('.card');
    if (!card) {
        return { found: false, hasTitle: false, titleText: null, hasIngredients: false, hasButton: false };
    }
    const title = card.querySelector('.card-title')?.textContent?.trim();
    return {
        found: true,
        hasTitle: !!title && !title.includes('NOM DE LA RECETTE'),
        titleText: title ?? null,
        hasIngredients: card.querySelectorAll('ul li').length > 0,
        hasButton: card.querySelector('a[href*="recipe.html"]') !== null,
    };
})()"#;

#[async_trait]
impl TestBattery for UiTestBattery {
    fn name(&self) -> &'static str {
        "ui"
    }

    fn case_names(&self) -> Vec<String> {
        case_names(UI_TEST_CASES)
    }

    fn max_score(&self) -> u32 {
        total_weight(UI_TEST_CASES)
    }

    async fn run_all(&self, base_url: &str) -> Vec<TestResult> {
        let (mut browser, executor, launched) = match self.open_page().await {
            Ok(opened) => opened,
            Err(e) => {
                warn!("⚠️ 无法打开前端页面: {}", e);
                return UI_TEST_CASES
                    .iter()
                    .map(|case| TestResult::errored(case.name, case.weight, e.to_string()))
                    .collect();
            }
        };

        tokio::time::sleep(RENDER_SETTLE).await;

        let mut results = Vec::with_capacity(UI_TEST_CASES.len());
        for case in UI_TEST_CASES {
            info!("  → {}", case.name);
            let result = match self.run_check(&executor, case.check, base_url).await {
                Ok(verdict) => TestResult::from_verdict(case.name, case.weight, verdict.passed, verdict.details),
                Err(e) => TestResult::errored(case.name, case.weight, e.to_string()),
            };
            results.push(result);
        }

        // 连接的浏览器只关闭自己打开的页面
        if launched {
            if let Err(e) = browser.close().await {
                warn!("关闭浏览器失败: {}", e);
            }
            let _ = browser.wait().await;
        } else if let Err(e) = executor.page().clone().close().await {
            warn!("关闭页面失败: {}", e);
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_card_probe_deserializes() {
        let probe: CardProbe = serde_json::from_value(serde_json::json!({
            "found": true,
            "hasTitle": true,
            "titleText": "Ratatouille",
            "hasIngredients": true,
            "hasButton": false,
        }))
        .unwrap();
        assert!(probe.found);
        assert!(probe.has_title && probe.has_ingredients && !probe.has_button);
    }

    #[tokio::test]
    #[ignore] // 需要本机安装 Chrome / Chromium 并启动前端
    async fn test_headless_run_produces_three_results() {
        let battery = UiTestBattery::from_config(&Config::from_env().unwrap());
        let results = battery.run_all("http://localhost:3000").await;
        assert_eq!(results.len(), UI_TEST_CASES.len());
    }
}
