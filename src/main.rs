use dither_howto::cli::CliOverrides;
use dither_howto::run_with_overrides;
use tracing::error;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).compact().init();
}

fn main() {
    init_tracing();
    let cli_overrides = match CliOverrides::parse_from_env() {
        Ok(parsed) => parsed.into_config_overrides(),
        Err(err) => {
            error!(error = %err, "cli_parse_failed");
            std::process::exit(2);
        }
    };
    if let Err(err) = run_with_overrides(cli_overrides) {
        error!(error = ?err, "application_error");
        std::process::exit(1);
    }
}
