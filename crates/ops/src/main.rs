//! Chorus operator CLI (chorus-ops)

use chorus_ops::{Cli, Context, init_logging, run};
use clap::Parser;
use tracing::debug;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.config.log_level);

    if let Err(errors) = cli.config.validate() {
        for error in &errors {
            eprintln!("Configuration error: {}", error);
        }
        std::process::exit(1);
    }

    debug!(
        registry = %cli.config.registry_db.display(),
        data_dir = %cli.config.data_dir.display(),
        "Opening tenant registry"
    );
    let ctx = Context::open(&cli.config)?;

    let mut stdout = std::io::stdout().lock();
    run(cli.command, &ctx, &mut stdout).await
}
