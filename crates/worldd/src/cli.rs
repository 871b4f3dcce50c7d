//! Command-line interface handling.
//!
//! This module defines the command-line arguments structure and parsing logic
//! for the world server daemon.

use clap::{value_parser, Arg, ArgMatches, Command};
use std::path::PathBuf;

/// Command-line arguments for the world server.
///
/// Every override is optional; anything left unset comes from the
/// configuration file.
#[derive(Debug, Clone)]
pub struct CliArgs {
    /// Path to the configuration file
    pub config_path: PathBuf,
    /// Optional override for bind address
    pub bind_address: Option<String>,
    /// Optional override for log level
    pub log_level: Option<String>,
    /// Whether to force JSON log output
    pub json_logs: bool,
    /// Optional override for map update threads; 0 means one per CPU core
    pub map_threads: Option<usize>,
}

impl CliArgs {
    /// Parses the process arguments. Exits with usage on invalid input.
    pub fn parse() -> Self {
        Self::from_matches(&command().get_matches())
    }

    /// Parses an explicit argument list, first element being the binary name.
    pub fn try_parse_from<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Ok(Self::from_matches(&command().try_get_matches_from(args)?))
    }

    fn from_matches(matches: &ArgMatches) -> Self {
        Self {
            config_path: matches
                .get_one::<String>("config")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("config.toml")),
            bind_address: matches.get_one::<String>("bind").cloned(),
            log_level: matches.get_one::<String>("log-level").cloned(),
            json_logs: matches.get_flag("json-logs"),
            map_threads: matches.get_one::<usize>("map-threads").copied(),
        }
    }
}

fn command() -> Command {
    Command::new("Realm World Server")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Realm world server: sessions, maps, combat and encounters")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("config.toml"),
        )
        .arg(
            Arg::new("bind")
                .short('b')
                .long("bind")
                .value_name("ADDRESS")
                .help("Bind address (e.g., 0.0.0.0:8085)"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("Log level (trace, debug, info, warn, error)"),
        )
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .help("Output logs in JSON format")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("map-threads")
                .short('t')
                .long("map-threads")
                .value_name("COUNT")
                .help("Threads updating maps each tick (0 = one per CPU core)")
                .value_parser(value_parser!(usize)),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_config_toml() {
        let args = CliArgs::try_parse_from(["worldd"]).unwrap();
        assert_eq!(args.config_path, PathBuf::from("config.toml"));
        assert!(args.bind_address.is_none());
        assert!(args.map_threads.is_none());
        assert!(!args.json_logs);
    }

    #[test]
    fn overrides_are_parsed() {
        let args = CliArgs::try_parse_from([
            "worldd",
            "--config",
            "realm.toml",
            "--bind",
            "0.0.0.0:9000",
            "-l",
            "debug",
            "--json-logs",
            "--map-threads",
            "4",
        ])
        .unwrap();
        assert_eq!(args.config_path, PathBuf::from("realm.toml"));
        assert_eq!(args.bind_address.as_deref(), Some("0.0.0.0:9000"));
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        assert!(args.json_logs);
        assert_eq!(args.map_threads, Some(4));
    }

    #[test]
    fn map_threads_must_be_a_number() {
        assert!(CliArgs::try_parse_from(["worldd", "--map-threads", "many"]).is_err());
    }
}
