use anyhow::{Context, Result, ensure};
use tracing::debug;

use splitsum_core::Config;

use crate::cli::CliArgs;

/// Resolve the effective configuration.
/// Priority: CLI flag > env var > config file > default.
pub fn resolve(args: &CliArgs) -> Result<Config> {
    let mut config = Config::load(args.config.as_deref()).with_context(|| match &args.config {
        Some(p) => format!("failed to load config: {}", p.display()),
        None => "failed to load config from environment".to_string(),
    })?;

    if let Some(threshold) = args.threshold {
        ensure!(threshold > 0, "--threshold must be at least 1");
        config.compute.threshold = threshold;
    }
    if let Some(workers) = args.workers {
        config.compute.worker_threads = workers;
    }

    debug!(?config, "resolved configuration");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn flags_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("compute.toml");
        std::fs::write(&path, "threshold = 50\nworker_threads = 6\n").unwrap();

        let args = CliArgs::parse_from([
            "splitsum",
            "--config",
            path.to_str().unwrap(),
            "--threshold",
            "5",
            "explain",
            "--n",
            "10",
        ]);
        let config = resolve(&args).unwrap();
        assert_eq!(config.compute.threshold, 5);
        assert_eq!(config.compute.worker_threads, 6);
    }

    #[test]
    fn zero_threshold_flag_rejected() {
        let args = CliArgs::parse_from(["splitsum", "--threshold", "0", "explain", "--n", "4"]);
        assert!(resolve(&args).is_err());
    }

    #[test]
    fn missing_config_file_has_context() {
        let args = CliArgs::parse_from([
            "splitsum",
            "--config",
            "/nonexistent/splitsum.toml",
            "explain",
            "--n",
            "4",
        ]);
        let err = resolve(&args).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/splitsum.toml"));
    }
}
