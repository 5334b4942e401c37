use clap::Parser;
use osm_transform::config::{Cli, Config};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() {
    let cli = Cli::parse();
    let debug_mode = cli.debug_mode;

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            if debug_mode {
                "debug".into()
            } else {
                "info".into()
            }
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let exit_code = match Config::resolve(cli) {
        Ok(config) => match osm_transform::driver::run(&config) {
            Ok(_) => 0,
            Err(err) => {
                tracing::error!(error = %err, "osm-transform failed");
                err.exit_code()
            }
        },
        Err(err) => {
            tracing::error!(error = %err, "invalid configuration");
            1
        }
    };

    std::process::exit(exit_code);
}
