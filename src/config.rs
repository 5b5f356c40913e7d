use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{GradeError, GradeResult};

/// 程序配置
///
/// 加载顺序：默认值 → TOML 文件（可选）→ 环境变量
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 被测服务器主机名
    pub host: String,
    /// 所有提交共用的固定端口
    pub port: u16,
    /// 就绪探测路径
    pub readiness_path: String,
    /// 启动超时（秒）
    pub startup_timeout_secs: u64,
    /// 就绪探测间隔（毫秒）
    pub probe_interval_ms: u64,
    /// 单次探测请求超时（毫秒）
    pub probe_request_timeout_ms: u64,
    /// 测试请求超时（毫秒）
    pub request_timeout_ms: u64,
    /// 就绪后等待服务稳定的时间（毫秒）
    pub stabilize_delay_ms: u64,
    /// 测试用例之间的间隔（毫秒）
    pub test_pacing_ms: u64,
    /// 进程组 SIGTERM 之后的宽限期（毫秒）
    pub kill_grace_ms: u64,
    /// 两个提交之间的冷却时间（毫秒）
    pub cooldown_ms: u64,
    /// 仓库内服务端目录名
    pub server_subdir: String,
    /// 项目清单文件名
    pub manifest_file: String,
    /// 运行入口文件的程序
    pub runtime_program: String,
    /// 执行通用启动命令的包管理器
    pub package_manager: String,
    /// GET / 期望返回的欢迎语
    pub greeting_message: String,
    /// 评分结果文件
    pub results_file: String,
    /// 运行日志文件
    pub output_log_file: String,
    /// 是否跳过结果文件中已评分的提交
    pub resume: bool,
    /// 每个进程保留的输出行数
    pub log_sink_capacity: usize,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    // --- 前端测试配置 ---
    pub enable_ui_battery: bool,
    pub frontend_url: String,
    pub browser_executable: Option<String>,
    pub browser_debug_port: Option<u16>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 3000,
            readiness_path: "/api/recipes".to_string(),
            startup_timeout_secs: 30,
            probe_interval_ms: 1000,
            probe_request_timeout_ms: 2000,
            request_timeout_ms: 5000,
            stabilize_delay_ms: 2000,
            test_pacing_ms: 0,
            kill_grace_ms: 500,
            cooldown_ms: 3000,
            server_subdir: "backend".to_string(),
            manifest_file: "package.json".to_string(),
            runtime_program: "node".to_string(),
            package_manager: "npm".to_string(),
            greeting_message: "Welcome To EPITA'S Exam !".to_string(),
            results_file: "grading_results.json".to_string(),
            output_log_file: "grading_log.txt".to_string(),
            resume: false,
            log_sink_capacity: 200,
            verbose_logging: false,
            enable_ui_battery: false,
            frontend_url: "http://localhost:5500".to_string(),
            browser_executable: None,
            browser_debug_port: None,
        }
    }
}

impl Config {
    /// 只使用默认值 + 环境变量
    pub fn from_env() -> GradeResult<Self> {
        Self::load(None)
    }

    /// 从 TOML 文件加载（如果提供），再应用环境变量，最后统一校验
    pub fn load(path: Option<&Path>) -> GradeResult<Self> {
        let base: Config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|e| {
                    GradeError::Config(format!("无法读取配置文件 {}: {}", path.display(), e))
                })?;
                toml::from_str(&content)?
            }
            None => Self::default(),
        };
        let config = base.with_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// 解析 TOML 配置，未出现的字段使用默认值
    pub fn from_toml_str(content: &str) -> GradeResult<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn with_env_overrides(self) -> Self {
        let d = self;
        Self {
            host: env_or("GRADER_HOST", d.host),
            port: env_parse_or("GRADER_PORT", d.port),
            readiness_path: env_or("READINESS_PATH", d.readiness_path),
            startup_timeout_secs: env_parse_or("STARTUP_TIMEOUT_SECS", d.startup_timeout_secs),
            probe_interval_ms: env_parse_or("PROBE_INTERVAL_MS", d.probe_interval_ms),
            probe_request_timeout_ms: env_parse_or("PROBE_REQUEST_TIMEOUT_MS", d.probe_request_timeout_ms),
            request_timeout_ms: env_parse_or("REQUEST_TIMEOUT_MS", d.request_timeout_ms),
            stabilize_delay_ms: env_parse_or("STABILIZE_DELAY_MS", d.stabilize_delay_ms),
            test_pacing_ms: env_parse_or("TEST_PACING_MS", d.test_pacing_ms),
            kill_grace_ms: env_parse_or("KILL_GRACE_MS", d.kill_grace_ms),
            cooldown_ms: env_parse_or("COOLDOWN_MS", d.cooldown_ms),
            server_subdir: env_or("SERVER_SUBDIR", d.server_subdir),
            manifest_file: env_or("MANIFEST_FILE", d.manifest_file),
            runtime_program: env_or("RUNTIME_PROGRAM", d.runtime_program),
            package_manager: env_or("PACKAGE_MANAGER", d.package_manager),
            greeting_message: env_or("GREETING_MESSAGE", d.greeting_message),
            results_file: env_or("RESULTS_FILE", d.results_file),
            output_log_file: env_or("OUTPUT_LOG_FILE", d.output_log_file),
            resume: env_parse_or("RESUME", d.resume),
            log_sink_capacity: env_parse_or("LOG_SINK_CAPACITY", d.log_sink_capacity),
            verbose_logging: env_parse_or("VERBOSE_LOGGING", d.verbose_logging),
            enable_ui_battery: env_parse_or("ENABLE_UI_BATTERY", d.enable_ui_battery),
            frontend_url: env_or("FRONTEND_URL", d.frontend_url),
            browser_executable: std::env::var("BROWSER_EXECUTABLE").ok().or(d.browser_executable),
            browser_debug_port: std::env::var("BROWSER_DEBUG_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .or(d.browser_debug_port),
        }
    }

    fn validate(&self) -> GradeResult<()> {
        if self.port == 0 {
            return Err(GradeError::Config("port 不能为 0".to_string()));
        }
        if !self.readiness_path.starts_with('/') {
            return Err(GradeError::Config(format!(
                "readiness_path 必须以 '/' 开头: {}",
                self.readiness_path
            )));
        }
        if self.log_sink_capacity == 0 {
            return Err(GradeError::Config("log_sink_capacity 不能为 0".to_string()));
        }
        Ok(())
    }

    /// 被测服务器的根地址
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }

    pub fn probe_request_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_request_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn stabilize_delay(&self) -> Duration {
        Duration::from_millis(self.stabilize_delay_ms)
    }

    pub fn test_pacing(&self) -> Duration {
        Duration::from_millis(self.test_pacing_ms)
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

fn env_or(name: &str, default: String) -> String {
    std::env::var(name).unwrap_or(default)
}

fn env_parse_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_base_url() {
        let config = Config::default();
        assert_eq!(config.base_url(), "http://localhost:3000");
        assert_eq!(config.startup_timeout(), Duration::from_secs(30));
        assert_eq!(config.probe_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_toml_overrides_only_given_fields() {
        let config = Config::from_toml_str(
            r#"
            port = 4100
            cooldown_ms = 0
            enable_ui_battery = true
            "#,
        )
        .unwrap();

        assert_eq!(config.port, 4100);
        assert_eq!(config.cooldown(), Duration::ZERO);
        assert!(config.enable_ui_battery);
        assert_eq!(config.server_subdir, "backend");
        assert_eq!(config.readiness_path, "/api/recipes");
    }

    #[test]
    fn test_invalid_values_from_environment_rejected() {
        // 只有这个测试设置该变量
        std::env::set_var("LOG_SINK_CAPACITY", "0");
        let result = Config::load(None);
        std::env::remove_var("LOG_SINK_CAPACITY");

        assert!(matches!(result, Err(GradeError::Config(ref msg)) if msg.contains("log_sink_capacity")));
    }

    #[test]
    fn test_invalid_readiness_path_rejected() {
        let result = Config::from_toml_str(r#"readiness_path = "api/recipes""#);
        assert!(matches!(result, Err(GradeError::Config(_))));
    }
}
