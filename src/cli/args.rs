use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::{debug, LevelFilter};

use crate::config::ConfigManager;
use crate::logging::{self, LogConfig, LogDestination, LogFormat};

/// Plugin host manifest tooling
#[derive(Parser, Debug)]
#[command(name = "plughost")]
#[command(about = "Validate, order and inspect plugin manifests for the plugin host")]
#[command(version)]
pub struct Args {
    /// Verbose output (debug level logging)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Quiet output (error level logging only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Debug output (trace level logging)
    #[arg(long, global = true)]
    pub debug: bool,

    /// Log format: text or json
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    pub log_format: String,

    /// Log file path for file output
    #[arg(long, value_name = "FILE", global = true)]
    pub log_file: Option<PathBuf>,

    /// Log level for file output (independent of console level)
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_file_level: Option<String>,

    /// Configuration file path
    #[arg(long, value_name = "FILE", global = true)]
    pub config_file: Option<PathBuf>,

    /// Configuration section name
    #[arg(long, value_name = "SECTION", global = true)]
    pub config_name: Option<String>,

    /// Disable coloured output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Discover and validate every manifest in a plugin directory
    Validate {
        /// Plugin directory (defaults to the configured directory)
        #[arg(value_name = "DIR")]
        directory: Option<PathBuf>,
    },
    /// Print the resolved initialization order
    Order {
        /// Plugin directory (defaults to the configured directory)
        #[arg(value_name = "DIR")]
        directory: Option<PathBuf>,
    },
    /// Show one manifest with its permissions
    Inspect {
        /// Manifest file (plugin.yaml, plugin.yml or plugin.json)
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Print the manifest re-serialised as yaml or json instead of a table
        #[arg(long, value_name = "FORMAT")]
        raw: Option<String>,
    },
}

/// Parse command line arguments
pub fn parse_args() -> Args {
    let args = Args::parse();
    debug!("Parsed CLI arguments: {:?}", args);
    args
}

/// Validate CLI argument combinations
pub fn validate_args(args: &Args) -> Result<()> {
    let log_flags_count = [args.verbose, args.quiet, args.debug].iter().filter(|&&flag| flag).count();
    if log_flags_count > 1 {
        return Err(anyhow::anyhow!(
            "Conflicting log level flags: only one of --verbose, --quiet, or --debug may be specified"
        ));
    }

    LogFormat::from_str(&args.log_format).map_err(|e| anyhow::anyhow!(e))?;

    if let Some(level) = &args.log_file_level {
        logging::parse_log_level(level)?;
        if args.log_file.is_none() {
            return Err(anyhow::anyhow!("--log-file-level requires --log-file to be specified"));
        }
    }

    if let Command::Inspect { raw: Some(format), .. } = &args.command {
        if !matches!(format.to_lowercase().as_str(), "yaml" | "json") {
            return Err(anyhow::anyhow!("Invalid raw format '{}'. Valid options: yaml, json", format));
        }
    }

    Ok(())
}

/// Load configuration from `--config-file` or the discovery hierarchy
pub fn load_configuration(args: &Args) -> Result<ConfigManager> {
    let mut manager = match &args.config_file {
        Some(path) => ConfigManager::load_from_file(path.clone())?,
        None => ConfigManager::load()?,
    };
    if let Some(section) = &args.config_name {
        manager.select_section(section.clone());
    }
    Ok(manager)
}

/// Build the logger configuration; flags win over the `[base]` section
pub fn configure_logging(args: &Args, config: &ConfigManager) -> Result<LogConfig> {
    let console_level = if args.debug {
        LevelFilter::Trace
    } else if args.verbose {
        LevelFilter::Debug
    } else if args.quiet {
        LevelFilter::Error
    } else {
        config.get_log_level("base", "log-level")?.unwrap_or(LevelFilter::Info)
    };

    let format = if args.log_format != "text" {
        LogFormat::from_str(&args.log_format).map_err(|e| anyhow::anyhow!(e))?
    } else {
        match config.get_value("base", "log-format") {
            Some(value) => LogFormat::from_str(value).map_err(|e| anyhow::anyhow!(e))?,
            None => LogFormat::Text,
        }
    };

    let log_file = args.log_file.clone().or_else(|| config.get_path("base", "log-file"));
    let file_level = match &args.log_file_level {
        Some(level) => Some(logging::parse_log_level(level)?),
        None => config.get_log_level("base", "log-file-level")?,
    };

    let (destination, file_level) = match log_file {
        Some(path) => (LogDestination::Both(path), Some(file_level.unwrap_or(console_level))),
        None => (LogDestination::Console, None),
    };

    Ok(LogConfig { console_level, file_level, format, destination })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Configuration;
    use std::collections::HashMap;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_subcommands() {
        let args = parse(&["plughost", "validate", "/srv/plugins"]);
        assert_eq!(args.command, Command::Validate { directory: Some(PathBuf::from("/srv/plugins")) });

        let args = parse(&["plughost", "order"]);
        assert_eq!(args.command, Command::Order { directory: None });

        let args = parse(&["plughost", "inspect", "plugin.yaml", "--raw", "json", "--no-color"]);
        assert!(args.no_color);
        assert!(matches!(args.command, Command::Inspect { raw: Some(_), .. }));
    }

    #[test]
    fn test_validate_args() {
        assert!(validate_args(&parse(&["plughost", "-v", "order"])).is_ok());
        assert!(validate_args(&parse(&["plughost", "-v", "-q", "order"])).is_err());
        assert!(validate_args(&parse(&["plughost", "--log-format", "xml", "order"])).is_err());
        assert!(validate_args(&parse(&["plughost", "--log-file-level", "debug", "order"])).is_err());
        assert!(validate_args(&parse(&["plughost", "inspect", "p.yaml", "--raw", "toml"])).is_err());
    }

    #[test]
    fn test_configure_logging_precedence() {
        let mut base = HashMap::new();
        base.insert("log-level".to_string(), "warn".to_string());
        base.insert("log-format".to_string(), "json".to_string());
        base.insert("log-file".to_string(), "/tmp/plughost.log".to_string());
        let mut config = Configuration::new();
        config.insert("base".to_string(), base);
        let manager = ConfigManager::from_config(config);

        let log = configure_logging(&parse(&["plughost", "order"]), &manager).unwrap();
        assert_eq!(log.console_level, LevelFilter::Warn);
        assert_eq!(log.format, LogFormat::Json);
        assert_eq!(log.destination, LogDestination::Both(PathBuf::from("/tmp/plughost.log")));
        assert_eq!(log.file_level, Some(LevelFilter::Warn));

        let log = configure_logging(&parse(&["plughost", "--debug", "order"]), &manager).unwrap();
        assert_eq!(log.console_level, LevelFilter::Trace);
    }
}
