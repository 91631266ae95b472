use murmur::settings::SettingsStore;
use murmur::shell::{self, ShellError};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ShellError> {
    // Logs go to stderr so they never interleave with the conversation on stdout.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let store = SettingsStore::load();
    tracing::debug!(path = ?store.config_path(), settings = ?store.settings(), "settings loaded");

    shell::run(store.settings().clone()).await
}
