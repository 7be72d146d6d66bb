use clap::Parser;
use slack_history::{Cli, Commands, Settings};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result: slack_history::Result<()> = async {
        let settings = Settings::load(cli.settings.as_deref())?;
        slack_history::logging::init(&settings.logging.filter)?;
        match &cli.command {
            Commands::Export(args) => {
                slack_history::commands::run_export(args, &settings.export).await
            }
        }
    }
    .await;

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
