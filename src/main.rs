//! pagerag CLI 진입점

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // CLI 파싱 (로그 레벨 결정에 --verbose 필요)
    let cli = pagerag::cli::Cli::parse();

    // 로깅 초기화 (stderr, RUST_LOG 우선)
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(pagerag::cli::run(cli))
}
