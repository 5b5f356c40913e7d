//! 后端接口测试集 - 测试集层
//!
//! 执行顺序：
//! 1. 列表 → 按 id 查询 → 404
//! 2. 创建合法数据 → 拒绝非法数据 → 创建后可见
//! 3. 非法参数 → 欢迎语（不计分）

use std::panic::AssertUnwindSafe;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use serde_json::{json, Value as JsonValue};
use tracing::{debug, info, warn};

use crate::battery::cases::{case_names, total_weight, ApiCheck, API_TEST_CASES};
use crate::battery::{panic_message, TestBattery, Verdict};
use crate::config::Config;
use crate::error::GradeError;
use crate::infrastructure::{HttpClient, HttpReply, NetworkError};
use crate::models::{TestCase, TestResult};

const RECIPES_PATH: &str = "/api/recipes";
const UNKNOWN_ID: u32 = 99999;

type CheckOutcome = Result<Verdict, NetworkError>;

/// 后端接口测试集
pub struct ApiTestBattery {
    request_timeout: Duration,
    pacing: Duration,
    greeting: String,
}

impl ApiTestBattery {
    pub fn new(request_timeout: Duration, pacing: Duration, greeting: impl Into<String>) -> Self {
        Self {
            request_timeout,
            pacing,
            greeting: greeting.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.request_timeout(),
            config.test_pacing(),
            config.greeting_message.clone(),
        )
    }

    async fn run_case(&self, client: &HttpClient, case: &TestCase<ApiCheck>) -> TestResult {
        info!("  → {}", case.name);

        let check = async {
            match case.check {
                ApiCheck::ListRecipes => list_recipes(client).await,
                ApiCheck::GetById => get_by_id(client).await,
                ApiCheck::NotFound => not_found(client).await,
                ApiCheck::CreateValid => create_valid(client).await,
                ApiCheck::RejectInvalid => reject_invalid(client).await,
                ApiCheck::CreatedVisible => created_visible(client).await,
                ApiCheck::MalformedId => malformed_id(client).await,
                ApiCheck::Greeting => greeting(client, &self.greeting).await,
            }
        };

        let result = match AssertUnwindSafe(check).catch_unwind().await {
            Ok(Ok(verdict)) => TestResult::from_verdict(case.name, case.weight, verdict.passed, verdict.details),
            Ok(Err(e)) => execution_failure(case, GradeError::test_execution(case.name, describe(&e))),
            Err(panic) => execution_failure(
                case,
                GradeError::test_execution(
                    case.name,
                    format!("检查过程异常: {}", panic_message(panic.as_ref())),
                ),
            ),
        };
        debug!("    {} {}/{}", if result.passed { "✓" } else { "✗" }, result.points, result.max_points);
        result
    }
}

#[async_trait]
impl TestBattery for ApiTestBattery {
    fn name(&self) -> &'static str {
        "api"
    }

    fn case_names(&self) -> Vec<String> {
        case_names(API_TEST_CASES)
    }

    fn max_score(&self) -> u32 {
        total_weight(API_TEST_CASES)
    }

    async fn run_all(&self, base_url: &str) -> Vec<TestResult> {
        let client = HttpClient::new(base_url, self.request_timeout);
        let mut results = Vec::with_capacity(API_TEST_CASES.len());

        for (index, case) in API_TEST_CASES.iter().enumerate() {
            if index > 0 && !self.pacing.is_zero() {
                tokio::time::sleep(self.pacing).await;
            }
            results.push(self.run_case(&client, case).await);
        }
        results
    }
}

// ========== 单项检查 ==========

async fn list_recipes(client: &HttpClient) -> CheckOutcome {
    let reply = client.get(RECIPES_PATH).await?;
    Ok(match array_len(&reply) {
        Some(len) if reply.status == 200 && len > 0 => Verdict::pass(format!("✓ 返回 {} 条菜谱", len)),
        Some(_) if reply.status == 200 => Verdict::fail("✗ 返回了空数组"),
        _ => Verdict::fail(format!("✗ 状态码 {}，响应不是数组", reply.status)),
    })
}

async fn get_by_id(client: &HttpClient) -> CheckOutcome {
    let reply = client.get(&format!("{}/1", RECIPES_PATH)).await?;
    if reply.status != 200 {
        return Ok(Verdict::fail(format!("✗ 状态码 {} 而不是 200", reply.status)));
    }

    let recipe = reply.json().unwrap_or(JsonValue::Null);
    let id_matches = match &recipe["id"] {
        JsonValue::Number(n) => n.as_u64() == Some(1),
        JsonValue::String(s) => s.trim() == "1",
        _ => false,
    };
    let name = recipe["name"].as_str().map(str::trim).unwrap_or_default();

    Ok(if id_matches && !name.is_empty() {
        Verdict::pass(format!("✓ 返回菜谱 \"{}\"", name))
    } else {
        Verdict::fail("✗ 返回的对象缺少 id = 1 或 name")
    })
}

async fn not_found(client: &HttpClient) -> CheckOutcome {
    let reply = client.get(&format!("{}/{}", RECIPES_PATH, UNKNOWN_ID)).await?;
    Ok(if reply.status == 404 {
        Verdict::pass("✓ 不存在的 id 返回 404")
    } else {
        Verdict::fail(format!("✗ 状态码 {} 而不是 404", reply.status))
    })
}

async fn create_valid(client: &HttpClient) -> CheckOutcome {
    let payload = recipe_payload("Test Recette Grader", json!(["Ingrédient 1", "Ingrédient 2"]), 15);
    let reply = client.post_json(RECIPES_PATH, &payload).await?;
    if !matches!(reply.status, 200 | 201) {
        return Ok(Verdict::fail(format!("✗ 状态码 {} 而不是 200/201", reply.status)));
    }

    let created = reply.json().unwrap_or(JsonValue::Null);
    let has_id = !matches!(created["id"], JsonValue::Null | JsonValue::Bool(false));
    let same_name = created["name"] == payload["name"];

    Ok(if has_id && same_name {
        Verdict::pass(format!("✓ 已创建，id = {}", created["id"]))
    } else {
        Verdict::fail("✗ 响应中缺少新分配的 id 或名称不一致")
    })
}

async fn reject_invalid(client: &HttpClient) -> CheckOutcome {
    let invalid = [
        ("空名称", recipe_payload("", json!(["Test"]), 10)),
        ("空配料", recipe_payload("Test Recipe", json!([]), 10)),
        ("负的准备时间", recipe_payload("Test Recipe", json!(["Test"]), -5)),
    ];

    for (label, payload) in &invalid {
        let reply = client.post_json(RECIPES_PATH, payload).await?;
        if reply.status != 400 {
            return Ok(Verdict::fail(format!(
                "✗ {}: 状态码 {} 而不是 400",
                label, reply.status
            )));
        }
    }
    Ok(Verdict::pass("✓ 三种非法数据均返回 400"))
}

async fn created_visible(client: &HttpClient) -> CheckOutcome {
    let before = client.get(RECIPES_PATH).await?;
    let Some(count_before) = array_len(&before) else {
        return Ok(Verdict::fail(format!("✗ 列表接口返回状态码 {}，不是数组", before.status)));
    };

    let payload = recipe_payload("Persistence Test", json!(["Test"]), 10);
    client.post_json(RECIPES_PATH, &payload).await?;

    let after = client.get(RECIPES_PATH).await?;
    let count_after = array_len(&after);
    Ok(if count_after == Some(count_before + 1) {
        Verdict::pass("✓ 新建的菜谱出现在列表中")
    } else {
        Verdict::fail(format!(
            "✗ 菜谱数量: 之前 {}，之后 {}",
            count_before,
            count_after.map(|n| n.to_string()).unwrap_or_else(|| "?".to_string())
        ))
    })
}

async fn malformed_id(client: &HttpClient) -> CheckOutcome {
    let reply = client.get(&format!("{}/abc", RECIPES_PATH)).await?;
    Ok(if reply.status >= 400 {
        Verdict::pass(format!("✓ 非法 id 返回 {}", reply.status))
    } else {
        Verdict::fail(format!("✗ 非法 id 返回 {}", reply.status))
    })
}

async fn greeting(client: &HttpClient, expected: &str) -> CheckOutcome {
    let reply = client.get("/").await?;
    let message = reply.json().and_then(|body| body["message"].as_str().map(str::to_string));
    Ok(if reply.status == 200 && message.as_deref() == Some(expected) {
        Verdict::pass("✓ 欢迎语正确")
    } else {
        Verdict::fail(format!("✗ 状态码 {}，message = {:?}", reply.status, message))
    })
}

// ========== 辅助函数 ==========

fn recipe_payload(name: &str, ingredients: JsonValue, prep_time: i64) -> JsonValue {
    json!({
        "name": name,
        "cuisine": "Test",
        "difficulty": "Facile",
        "prepTime": prep_time,
        "servings": 2,
        "ingredients": ingredients,
        "instructions": "Instructions de test",
    })
}

fn array_len(reply: &HttpReply) -> Option<usize> {
    if reply.status != 200 {
        return None;
    }
    reply.json().and_then(|body| body.as_array().map(Vec::len))
}

/// 用例没能给出判定：记 0 分，错误原因写进结果
fn execution_failure(case: &TestCase<ApiCheck>, error: GradeError) -> TestResult {
    warn!("    ⚠️ {}", error);
    TestResult::errored(case.name, case.weight, error.to_string())
}

fn describe(error: &NetworkError) -> String {
    match error {
        NetworkError::ConnectionRefused => "无法连接到服务器".to_string(),
        NetworkError::ConnectionReset => "服务器中途断开连接".to_string(),
        NetworkError::Timeout => "请求超时".to_string(),
        NetworkError::Other(message) => message.clone(),
    }
}
