//! 启动入口解析 - 业务能力层
//!
//! 给定服务端目录，确定性地决定启动命令。顺序：
//! 1. 约定文件名扫描（顺序即优先级）
//! 2. 清单 main 字段（文件必须存在）
//! 3. 清单 start 脚本中的 `<runtime> <file>.js`（文件必须存在）
//! 4. 清单的通用 start 命令

use std::path::{Path, PathBuf};

use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{GradeError, GradeResult};
use crate::models::{EntryPoint, LaunchSpec};

/// 约定入口文件，顺序不可调整
pub const ENTRY_CANDIDATES: &[&str] = &[
    "index.js",
    "server.js",
    "app.js",
    "main.js",
    "src/server.js",
    "src/index.js",
];

/// 清单中用到的字段
#[derive(Debug, Default, Deserialize)]
struct Manifest {
    main: Option<String>,
    #[serde(default)]
    scripts: ManifestScripts,
}

#[derive(Debug, Default, Deserialize)]
struct ManifestScripts {
    start: Option<String>,
}

/// 启动入口解析器
pub struct EntryPointResolver {
    runtime_program: String,
    package_manager: String,
    manifest_file: String,
    port: u16,
    start_script_pattern: Regex,
}

impl EntryPointResolver {
    pub fn new(
        runtime_program: impl Into<String>,
        package_manager: impl Into<String>,
        manifest_file: impl Into<String>,
        port: u16,
    ) -> GradeResult<Self> {
        let runtime_program = runtime_program.into();
        let pattern = format!(r"(?:^|[\s;&|]){}\s+(\S+\.js)\b", regex::escape(&runtime_program));
        let start_script_pattern = Regex::new(&pattern)
            .map_err(|e| GradeError::Config(format!("无效的启动脚本匹配规则: {}", e)))?;

        Ok(Self {
            runtime_program,
            package_manager: package_manager.into(),
            manifest_file: manifest_file.into(),
            port,
            start_script_pattern,
        })
    }

    pub fn from_config(config: &Config) -> GradeResult<Self> {
        Self::new(
            config.runtime_program.clone(),
            config.package_manager.clone(),
            config.manifest_file.clone(),
            config.port,
        )
    }

    /// 解析服务端目录的启动命令
    pub fn resolve(&self, server_dir: &Path) -> GradeResult<LaunchSpec> {
        let entry = self.resolve_entry(server_dir)?;
        info!("🔍 启动入口: {} ({:?})", entry.kind(), entry.file());
        Ok(LaunchSpec::from_entry(
            entry,
            &self.runtime_program,
            &self.package_manager,
            server_dir,
            self.port,
        ))
    }

    /// 只判定入口，不构造命令
    pub fn resolve_entry(&self, server_dir: &Path) -> GradeResult<EntryPoint> {
        if let Some(file) = ENTRY_CANDIDATES
            .iter()
            .map(PathBuf::from)
            .find(|candidate| server_dir.join(candidate).is_file())
        {
            return Ok(EntryPoint::KnownFile(file));
        }
        debug!("约定入口均不存在，读取清单");

        let manifest_path = server_dir.join(&self.manifest_file);
        if !manifest_path.is_file() {
            return Err(GradeError::entry_point_not_found(
                server_dir,
                format!("没有约定入口文件，也没有 {}", self.manifest_file),
            ));
        }
        let manifest = read_manifest(&manifest_path)?;

        if let Some(main) = manifest.main.as_deref().filter(|m| !m.trim().is_empty()) {
            let main = PathBuf::from(main.trim());
            if server_dir.join(&main).is_file() {
                return Ok(EntryPoint::ManifestMain(main));
            }
            debug!("清单 main 指向的文件不存在: {}", main.display());
        }

        let Some(script) = manifest.scripts.start.filter(|s| !s.trim().is_empty()) else {
            return Err(GradeError::entry_point_not_found(
                server_dir,
                "清单中既没有可用的 main，也没有 start 脚本",
            ));
        };

        if let Some(file) = self.script_file(&script) {
            if server_dir.join(&file).is_file() {
                return Ok(EntryPoint::ManifestStartScript { script, file });
            }
            debug!("start 脚本中的文件不存在: {}", file.display());
        }

        Ok(EntryPoint::GenericStartCommand { script })
    }

    /// 从 start 脚本中提取 `<runtime> <file>.js` 的文件部分
    fn script_file(&self, script: &str) -> Option<PathBuf> {
        self.start_script_pattern
            .captures(script)
            .and_then(|caps| caps.get(1))
            .map(|m| PathBuf::from(m.as_str().trim_start_matches("./")))
    }
}

fn read_manifest(path: &Path) -> GradeResult<Manifest> {
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|e| {
        GradeError::entry_point_not_found(
            path.parent().unwrap_or(path),
            format!("清单无法解析: {}", e),
        )
    })
}
