// Entrypoint for the CLI application.
// - Keeps `main` small: configure logging, build an API client and hand it
//   to the UI loop.
// - Logs go to stderr so they do not interleave with the prompts.

use tracing_subscriber::EnvFilter;
use vendor_pricing_cli::{api::ApiClient, config::load_app_config, ui::main_menu};

fn main() -> anyhow::Result<()> {
    let config = load_app_config()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.log_filter))
        .with_writer(std::io::stderr)
        .init();

    let api = ApiClient::new(&config)?;
    tracing::debug!(backend = api.base_url(), "client ready");

    // Blocks until the operator exits.
    main_menu(api)?;
    Ok(())
}
