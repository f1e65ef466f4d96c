use tracing_subscriber::EnvFilter;

pub type InitError = Box<dyn std::error::Error + Send + Sync>;

/// Install the global subscriber. `RUST_LOG` takes precedence over `level`.
pub fn init(level: &str, json: bool) -> Result<(), InitError> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    }
}
