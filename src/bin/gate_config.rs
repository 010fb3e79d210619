//! Print the effective admission configuration as JSON.
//!
//! Usage: `gate-config [CONFIG.yaml]`. Without an argument the config is
//! resolved exactly as the library does at runtime (`AI_GATE_CONFIG_PATH`
//! plus `AI_GATE_*` overrides). Logs go to stderr, filtered by `RUST_LOG`.

use ai_gate_rust::AdmissionConfig;
use anyhow::Context;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => {
            let mut config = AdmissionConfig::from_path(&path)
                .with_context(|| format!("failed to load {}", path))?;
            config.apply_env();
            config
        }
        None => AdmissionConfig::load(),
    };
    config.validate().context("effective configuration is invalid")?;

    let json = serde_json::to_string_pretty(&config).context("failed to serialize configuration")?;
    println!("{}", json);
    Ok(())
}
