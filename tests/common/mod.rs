//! 集成测试共用的假菜谱服务器
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

pub const GREETING: &str = "Welcome To EPITA'S Exam !";

/// 假服务器的行为开关
#[derive(Clone, Copy)]
pub struct Behavior {
    /// 是否拒绝空名称
    pub validate_name: bool,
    /// 所有请求都返回 500
    pub always_500: bool,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            validate_name: true,
            always_500: false,
        }
    }
}

#[derive(Clone)]
struct AppState {
    recipes: Arc<Mutex<Vec<Value>>>,
    behavior: Behavior,
}

fn seed() -> Vec<Value> {
    ["Ratatouille", "Paella", "Ramen", "Tajine", "Pad Thai"]
        .iter()
        .enumerate()
        .map(|(i, name)| {
            json!({
                "id": i + 1,
                "name": name,
                "cuisine": "Test",
                "difficulty": "Facile",
                "prepTime": 20,
                "servings": 4,
                "ingredients": ["a", "b"],
                "instructions": "mix",
            })
        })
        .collect()
}

async fn greeting(State(state): State<AppState>) -> Response {
    if state.behavior.always_500 {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    Json(json!({ "message": GREETING })).into_response()
}

async fn list_recipes(State(state): State<AppState>) -> Response {
    if state.behavior.always_500 {
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": "boom"}))).into_response();
    }
    let recipes = state.recipes.lock().unwrap().clone();
    Json(Value::Array(recipes)).into_response()
}

async fn get_recipe(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let Ok(id) = id.parse::<u64>() else {
        return (StatusCode::BAD_REQUEST, Json(json!({"error": "invalid id"}))).into_response();
    };
    let recipes = state.recipes.lock().unwrap();
    match recipes.iter().find(|r| r["id"] == id) {
        Some(recipe) => Json(recipe.clone()).into_response(),
        None => (StatusCode::NOT_FOUND, Json(json!({"error": "not found"}))).into_response(),
    }
}

async fn create_recipe(State(state): State<AppState>, Json(mut body): Json<Value>) -> Response {
    let name_empty = body["name"].as_str().map(str::trim).unwrap_or_default().is_empty();
    let no_ingredients = body["ingredients"].as_array().map_or(true, Vec::is_empty);
    let negative_time = body["prepTime"].as_i64().map_or(true, |t| t < 0);

    if (state.behavior.validate_name && name_empty) || no_ingredients || negative_time {
        return (StatusCode::BAD_REQUEST, Json(json!({"error": "invalid recipe"}))).into_response();
    }

    let mut recipes = state.recipes.lock().unwrap();
    body["id"] = json!(recipes.len() + 1);
    recipes.push(body.clone());
    (StatusCode::CREATED, Json(body)).into_response()
}

/// 在随机端口启动假服务器，返回根地址
pub async fn spawn_recipe_server(behavior: Behavior) -> String {
    let state = AppState {
        recipes: Arc::new(Mutex::new(seed())),
        behavior,
    };
    let app = Router::new()
        .route("/", get(greeting))
        .route("/api/recipes", get(list_recipes).post(create_recipe))
        .route("/api/recipes/:id", get(get_recipe))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

/// 绑定后立即释放，得到一个当前空闲的端口
pub fn free_port() -> u16 {
    std::net::TcpListener::bind("0.0.0.0:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// 断言端口上已经没有任何监听者：两个地址族都能重新绑定，回环地址都连不上
pub fn assert_port_released(port: u16) {
    use std::net::{TcpListener, TcpStream};

    let ipv6 = TcpListener::bind("[::1]:0").is_ok();
    let mut addrs = vec![format!("0.0.0.0:{}", port)];
    if ipv6 {
        addrs.push(format!("[::]:{}", port));
    }
    for addr in &addrs {
        if let Err(e) = TcpListener::bind(addr.as_str()) {
            panic!("cannot rebind {}: {}", addr, e);
        }
    }

    let mut loopbacks = vec![format!("127.0.0.1:{}", port)];
    if ipv6 {
        loopbacks.push(format!("[::1]:{}", port));
    }
    for addr in &loopbacks {
        assert!(TcpStream::connect(addr.as_str()).is_err(), "{} still accepts connections", addr);
    }
}
