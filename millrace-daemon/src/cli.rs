//! Command-line interface of the daemon.

use std::path::PathBuf;

use clap::Parser;

/// Event processing daemon: framed TCP ingest, predicate routing into
/// catalog-defined environments, per-asset trace sinks.
///
/// The daemon is driven entirely by `millrace.toml` and the environment
/// catalog it points at. Flags only override logging or switch into one of
/// the inspection modes (`--validate`, `--print-graph`) that exit without
/// serving.
#[derive(Parser, Debug)]
#[command(name = "millrace-daemon", version, about, long_about = None)]
pub struct DaemonCli {
    /// Configuration file to load.
    #[arg(short, long, default_value = "/etc/millrace/millrace.toml")]
    pub config: PathBuf,

    /// Log level override (trace, debug, info, warn, error); wins over the
    /// config file.
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Log format override ("json" or "pretty"); wins over the config file.
    #[arg(long, value_name = "FORMAT")]
    pub log_format: Option<String>,

    /// Parse and validate the configuration, then exit.
    #[arg(long)]
    pub validate: bool,

    /// Compile one environment from the catalog and dump its topology as
    /// Graphviz, then exit.
    #[arg(long, value_name = "ENVIRONMENT")]
    pub print_graph: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_etc_millrace() {
        let cli = DaemonCli::parse_from(["millrace-daemon"]);
        assert_eq!(cli.config, PathBuf::from("/etc/millrace/millrace.toml"));
        assert!(!cli.validate);
        assert!(cli.log_level.is_none());
        assert!(cli.print_graph.is_none());
    }

    #[test]
    fn inspection_flags_and_overrides_parse() {
        let cli = DaemonCli::parse_from([
            "millrace-daemon",
            "--config",
            "/tmp/m.toml",
            "--log-level",
            "debug",
            "--print-graph",
            "prod",
        ]);
        assert_eq!(cli.config, PathBuf::from("/tmp/m.toml"));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert_eq!(cli.print_graph.as_deref(), Some("prod"));
    }
}
