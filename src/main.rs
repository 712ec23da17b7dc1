use std::sync::Arc;

use tubescribe::transcribe::ModelCache;
use tubescribe::{run_gui, run_headless, Cli};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tubescribe=info".into()),
        )
        .init();

    let cli = <Cli as clap::Parser>::parse();

    if cli.no_ui {
        return run_headless(cli);
    }

    let models = Arc::new(ModelCache::new());
    let result = run_gui(cli, models.clone());
    models.clear();
    result
}
