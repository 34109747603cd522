//! Command line for the enrichment tool.
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::Config;

#[derive(Parser, Debug)]
#[command(
    name = "history-enricher",
    version,
    about = "Enrich a listening-history export with catalog identifiers and audio attributes",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    /// Config file to use instead of the per-user default
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log debug output
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Enrich a history file, resuming from any previous output
    Run(RunArgs),
    /// Authorize again through the browser and store the new token
    Login,
    /// Show the stored token without contacting the catalog
    TokenStatus,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Listening-history file with Artist, Album and Track columns
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Minimum plays for a track to be enriched
    #[arg(long, value_name = "N")]
    pub threshold: Option<u32>,

    /// Enriched output file (also the resume checkpoint)
    #[arg(long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// File listing tracks the catalog returned no attributes for
    #[arg(long, value_name = "FILE")]
    pub missing_output: Option<PathBuf>,

    /// Minimum milliseconds between catalog requests
    #[arg(long, value_name = "MS")]
    pub interval_ms: Option<u64>,
}

impl RunArgs {
    /// Overlays the flags that were given on top of the loaded config.
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(threshold) = self.threshold {
            config.pipeline.min_play_count = threshold;
        }
        if let Some(output) = &self.output {
            config.pipeline.output_path = output.display().to_string();
        }
        if let Some(missing_output) = &self.missing_output {
            config.pipeline.missing_tracks_path = missing_output.display().to_string();
        }
        if let Some(interval_ms) = self.interval_ms {
            config.pipeline.request_interval_ms = interval_ms;
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Command, RootArgs};
    use crate::config::Config;

    #[test]
    fn test_run_flags_override_config() {
        let args = RootArgs::try_parse_from([
            "history-enricher",
            "run",
            "history.csv",
            "--threshold",
            "2",
            "--output",
            "out.csv",
            "--interval-ms",
            "250",
        ])
        .expect("arguments should parse");
        let Command::Run(run) = args.command else {
            panic!("expected run command");
        };

        let mut config = Config::default();
        run.apply_to(&mut config);
        assert_eq!(config.pipeline.min_play_count, 2);
        assert_eq!(config.pipeline.output_path, "out.csv");
        assert_eq!(config.pipeline.request_interval_ms, 250);
        assert_eq!(config.pipeline.missing_tracks_path, "missing_tracks.csv");
    }

    #[test]
    fn test_global_flags_parse_after_subcommand() {
        let args = RootArgs::try_parse_from([
            "history-enricher",
            "token-status",
            "--config",
            "alt.toml",
            "-v",
        ])
        .expect("arguments should parse");
        assert!(matches!(args.command, Command::TokenStatus));
        assert!(args.verbose);
        assert_eq!(
            args.config.as_deref(),
            Some(std::path::Path::new("alt.toml"))
        );
    }

    #[test]
    fn test_run_requires_input() {
        assert!(RootArgs::try_parse_from(["history-enricher", "run"]).is_err());
    }
}
