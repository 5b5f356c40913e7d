use std::path::PathBuf;

use anyhow::Result;
use exam_grader::utils::logging;
use exam_grader::{App, Config};

/// 用法: exam-grader [roster.toml | submissions_dir] [config.toml]
#[tokio::main]
async fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let source = PathBuf::from(args.next().unwrap_or_else(|| "submissions".to_string()));
    let config_path = args.next().map(PathBuf::from);

    // 加载配置
    let config = Config::load(config_path.as_deref())?;

    // 初始化日志
    logging::init(config.verbose_logging);

    // 初始化并运行应用
    let app = App::initialize(config).await?;
    app.run(&source).await?;

    Ok(())
}
