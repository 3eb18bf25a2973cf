use clap::Parser;

mod cli;
mod commands;

fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();
    let config = commands::load_config(&cli)?;
    let max_level = if cli.verbose {
        tracing::level_filters::LevelFilter::DEBUG
    } else {
        config.log_level.level_filter()
    };
    tracing_subscriber::fmt()
        .with_max_level(max_level)
        .with_writer(std::io::stderr)
        .init();
    commands::run_command(cli, &config)
}
