use anyhow::{Context, Result};
use clap::Parser;
use nbcloud_cli::{
    build_manager, format_content, format_listing, load_config, open_cloud, save_cloud, save_model_for_file, upload,
    Cli, Command,
};
use nbcloud_core::logger::{init_logger, read_log_tail};
use nbcloud_shared::ContentsConfig;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // 解析命令行参数
    let mut cli = Cli::parse();

    // 如果指定了verbose参数，设置日志级别为debug
    if cli.verbose {
        cli.log_level = "debug".to_string();
    }

    // 初始化日志
    init_logger(&cli.log_level, false)?;

    // 不需要云端的命令
    match &cli.command {
        Command::Init { path } => {
            ContentsConfig::default().save_to_file(path)?;
            println!("已生成默认配置文件: {:?}", path);
            return Ok(());
        }
        Command::Logs { tail } => {
            println!("{}", read_log_tail(*tail)?);
            return Ok(());
        }
        _ => {}
    }

    let config = load_config(&cli)?;
    let cloud = open_cloud(&config).await?;
    let manager = build_manager(&config, &cloud);

    let outcome = match &cli.command {
        Command::Ls { path } => manager
            .get(path, true, None, None)
            .await
            .map(|model| println!("{}", format_listing(&model))),

        Command::Cat { path } => match manager.get(path, true, None, Some("text")).await {
            Ok(model) => {
                println!("{}", format_content(&model)?);
                Ok(())
            }
            Err(e) => Err(e),
        },

        Command::Put { file, path, notebook } => {
            let bytes = tokio::fs::read(file)
                .await
                .with_context(|| format!("无法读取文件: {:?}", file))?;
            let model = save_model_for_file(file, bytes, *notebook)?;
            upload(&manager, &model, path).await.map(|saved| {
                info!(path = %saved.path, "uploaded");
                println!("已保存: {}", saved.path);
                if let Some(message) = &saved.message {
                    println!("# {}", message);
                }
            })
        }

        Command::Rm { path } => manager.delete(path).await.map(|()| println!("已删除: {}", path)),

        Command::Mv { old_path, new_path } => manager
            .rename(old_path, new_path)
            .await
            .map(|()| println!("已重命名: {} -> {}", old_path, new_path)),

        Command::Exists { path } => {
            let found = match manager.file_exists(path).await {
                Ok(true) => Ok(true),
                Ok(false) => manager.dir_exists(path).await,
                Err(e) => Err(e),
            };
            found.map(|found| println!("{}", found))
        }

        Command::Init { .. } | Command::Logs { .. } => Ok(()),
    };

    if let Err(e) = outcome {
        error!(status = e.status(), "{}", e);
        anyhow::bail!("[{}] {}", e.status(), e);
    }

    if cli.command.mutates() {
        save_cloud(&config, &cloud).await?;
    }
    Ok(())
}
