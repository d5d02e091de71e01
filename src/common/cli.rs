//! CLI argument parsing for the acquisition binary

use clap::Parser;

/// Arguments for the `acquire` binary
#[derive(Parser, Debug, Clone)]
#[command(name = "acquire", about = "Run a TTTR acquisition session")]
pub struct AcquireArgs {
    /// Path to configuration file
    #[arg(short = 'f', long = "config", default_value = "config.toml")]
    pub config_file: String,

    /// Override the acquisition duration in milliseconds
    #[arg(long = "duration-ms")]
    pub duration_ms: Option<u64>,

    /// Override the record mode (T2 or T3)
    #[arg(long)]
    pub mode: Option<String>,

    /// Override the number of emulated streams
    #[arg(long)]
    pub streams: Option<usize>,

    /// Output directory for sink files
    #[arg(short = 'o', long = "output")]
    pub output_dir: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = AcquireArgs::parse_from(["acquire"]);
        assert_eq!(args.config_file, "config.toml");
        assert!(args.duration_ms.is_none());
        assert!(args.mode.is_none());
    }

    #[test]
    fn test_overrides() {
        let args = AcquireArgs::parse_from([
            "acquire",
            "--config",
            "run.toml",
            "--duration-ms",
            "500",
            "--mode",
            "T3",
            "--streams",
            "2",
        ]);
        assert_eq!(args.config_file, "run.toml");
        assert_eq!(args.duration_ms, Some(500));
        assert_eq!(args.mode.as_deref(), Some("T3"));
        assert_eq!(args.streams, Some(2));
    }
}
