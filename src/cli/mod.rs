//! Command-line interface for copyexport
//!
//! This module handles:
//! - Command-line argument parsing using clap
//! - Configuration loading and verbosity overrides
//! - Dispatch of the `list`, `run`, `validate`, `render`, `config`,
//!   `completion` and `version` subcommands

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

use crate::config::{Config, LogLevel};
use crate::error::{ConfigurationError, ExportError, Result};
use crate::export::{ExportService, ProviderRegistry, suggested_filename_today};
use crate::sql::{build_copy_sql, render};
use crate::validator::{MAX_ROWS_PARAM, ParamValue, RawParams};

pub mod completion;
pub mod output;

/// Configuration-driven CSV exports over PostgreSQL COPY
#[derive(Parser, Debug)]
#[command(
    name = "copyexport",
    version,
    about = "Configuration-driven CSV exports over PostgreSQL COPY",
    long_about = "Runs named, parameterized CSV exports declared in configuration.
Parameters are validated and rendered into the export's SQL, which is streamed
through COPY ... TO STDOUT without buffering the result set."
)]
pub struct CliArgs {
    /// Configuration file path
    #[arg(short = 'c', long = "config", value_name = "FILE", global = true)]
    pub config_file: Option<PathBuf>,

    /// Quiet mode (errors only)
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,

    /// Verbose mode (detailed logging)
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Very verbose mode (trace logging)
    #[arg(long = "vv", global = true)]
    pub very_verbose: bool,

    /// Subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Subcommands for copyexport
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List configured exports
    List {
        /// Print only the export keys, one per line
        #[arg(long)]
        keys: bool,
    },

    /// Run an export and write its CSV
    Run {
        /// Export key
        key: String,

        /// Request parameter; repeat a name to pass a list
        #[arg(short = 'p', long = "param", value_name = "NAME=VALUE", value_parser = parse_param)]
        params: Vec<(String, String)>,

        /// Lower the row cap for this run
        #[arg(long, value_name = "N")]
        max_rows: Option<String>,

        /// Output file or directory (stdout if omitted)
        #[arg(short = 'o', long, value_name = "PATH")]
        output: Option<PathBuf>,
    },

    /// Validate parameters without running the export
    Validate {
        /// Export key
        key: String,

        /// Request parameter; repeat a name to pass a list
        #[arg(short = 'p', long = "param", value_name = "NAME=VALUE", value_parser = parse_param)]
        params: Vec<(String, String)>,

        /// Row cap to negotiate
        #[arg(long, value_name = "N")]
        max_rows: Option<String>,
    },

    /// Print the COPY statement an SQL-backed export would run
    Render {
        /// Export key
        key: String,

        /// Request parameter; repeat a name to pass a list
        #[arg(short = 'p', long = "param", value_name = "NAME=VALUE", value_parser = parse_param)]
        params: Vec<(String, String)>,

        /// Row cap to negotiate
        #[arg(long, value_name = "N")]
        max_rows: Option<String>,
    },

    /// Show or validate configuration
    Config {
        /// Show effective configuration
        #[arg(long)]
        show: bool,

        /// Validate configuration and export definitions
        #[arg(long)]
        validate: bool,
    },

    /// Generate shell completion script
    Completion {
        /// Shell type (bash, zsh, fish)
        #[arg(value_name = "SHELL")]
        shell: String,
    },

    /// Show version information
    Version,
}

/// Parse a `name=value` pair. The value may be empty or contain `=`.
fn parse_param(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected NAME=VALUE, got '{raw}'")),
    }
}

/// Collect `-p` pairs and `--max-rows` into raw request parameters.
pub fn raw_params(params: &[(String, String)], max_rows: Option<&str>) -> RawParams {
    let mut raw = RawParams::new();
    for (name, value) in params {
        raw.entry(name.clone()).or_default().push(value.clone());
    }
    if let Some(max_rows) = max_rows {
        raw.insert(MAX_ROWS_PARAM.to_string(), vec![max_rows.to_string()]);
    }
    raw
}

/// CLI interface handler
pub struct CliInterface {
    /// Parsed command-line arguments
    args: CliArgs,

    /// Loaded configuration
    config: Config,
}

impl CliInterface {
    /// Create a new CLI interface
    ///
    /// # Returns
    /// * `Result<Self>` - New CLI interface or error
    pub fn new() -> Result<Self> {
        let args = CliArgs::parse();
        Self::from_args(args)
    }

    /// Create a CLI interface from already parsed arguments
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let mut config = Config::load(args.config_file.as_deref())?;
        Self::apply_logging_args(&mut config, &args);
        Ok(Self { args, config })
    }

    /// Get the configuration
    ///
    /// # Returns
    /// * `&Config` - Reference to configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the CLI arguments
    ///
    /// # Returns
    /// * `&CliArgs` - Reference to arguments
    pub fn args(&self) -> &CliArgs {
        &self.args
    }

    /// Apply logging-related CLI arguments to configuration
    fn apply_logging_args(config: &mut Config, args: &CliArgs) {
        config.logging.level = if args.very_verbose {
            LogLevel::Trace
        } else if args.verbose {
            LogLevel::Debug
        } else if args.quiet {
            LogLevel::Error
        } else {
            config.logging.level
        };
    }

    /// Log filter for the subscriber
    ///
    /// `-q`, `-v` and `--vv` always win. Otherwise a valid `rust_log`
    /// directive string (normally `RUST_LOG`) is used, falling back to the
    /// configured level.
    pub fn log_filter(&self, rust_log: Option<&str>) -> EnvFilter {
        let flags_given = self.args.quiet || self.args.verbose || self.args.very_verbose;
        if !flags_given {
            if let Some(filter) = rust_log
                .filter(|directives| !directives.trim().is_empty())
                .and_then(|directives| EnvFilter::try_new(directives).ok())
            {
                return filter;
            }
        }
        let level = LevelFilter::from_level(self.config.logging.level.to_tracing_level());
        EnvFilter::new(level.to_string())
    }

    /// Execute the selected subcommand
    ///
    /// # Returns
    /// * `Result<()>` - Success or error
    pub async fn execute(&self) -> Result<()> {
        match &self.args.command {
            Commands::List { keys } => self.list(*keys),
            Commands::Run {
                key,
                params,
                max_rows,
                output,
            } => {
                let raw = raw_params(params, max_rows.as_deref());
                self.run_export(key, &raw, output.as_deref()).await
            }
            Commands::Validate {
                key,
                params,
                max_rows,
            } => self.validate_request(key, &raw_params(params, max_rows.as_deref())),
            Commands::Render {
                key,
                params,
                max_rows,
            } => self.render_sql(key, &raw_params(params, max_rows.as_deref())),
            Commands::Config { show, validate } => self.handle_config_command(*show, *validate),
            Commands::Completion { shell } => completion::generate_completion(shell),
            Commands::Version => {
                self.show_version();
                Ok(())
            }
        }
    }

    fn service(&self) -> Result<ExportService> {
        let registry = self.config.build_registry(ProviderRegistry::new())?;
        Ok(ExportService::new(Arc::new(registry)))
    }

    fn list(&self, keys_only: bool) -> Result<()> {
        let service = self.service()?;
        if keys_only {
            for key in service.registry().keys() {
                println!("{key}");
            }
        } else {
            println!("{}", output::definitions_table(service.registry().definitions()));
        }
        Ok(())
    }

    async fn run_export(&self, key: &str, raw: &RawParams, output: Option<&Path>) -> Result<()> {
        let service = self.service()?;

        let Some(path) = output else {
            let mut stdout = BufWriter::new(tokio::io::stdout());
            let rows = service.stream_csv(key, raw, &mut stdout).await?;
            stdout.flush().await?;
            self.report_rows(key, rows, None);
            return Ok(());
        };

        let path = if path.is_dir() {
            path.join(suggested_filename_today(key))
        } else {
            path.to_path_buf()
        };
        debug!("Writing export {} to {}", key, path.display());

        let file = tokio::fs::File::create(&path).await?;
        let mut writer = BufWriter::new(file);
        let result = stream_and_flush(&service, key, raw, &mut writer).await;
        drop(writer);

        match result {
            Ok(rows) => {
                self.report_rows(key, rows, Some(&path));
                Ok(())
            }
            Err(e) => {
                if let Err(remove_err) = tokio::fs::remove_file(&path).await {
                    warn!("Could not remove {}: {}", path.display(), remove_err);
                }
                Err(e)
            }
        }
    }

    fn report_rows(&self, key: &str, rows: Option<u64>, path: Option<&Path>) {
        if self.args.quiet {
            return;
        }
        let rows = rows.map_or_else(|| "unknown".to_string(), |n| n.to_string());
        match path {
            Some(path) => eprintln!("Exported {} ({} rows) to {}", key, rows, path.display()),
            None => eprintln!("Exported {} ({} rows)", key, rows),
        }
    }

    fn validate_request(&self, key: &str, raw: &RawParams) -> Result<()> {
        let service = self.service()?;
        let (_, validated) = service.validate(key, raw)?;
        println!("{}", output::validated_table(&validated));
        Ok(())
    }

    fn render_sql(&self, key: &str, raw: &RawParams) -> Result<()> {
        let service = self.service()?;
        let (definition, validated) = service.validate(key, raw)?;
        let sql = definition.sql().ok_or_else(|| {
            ExportError::from(ConfigurationError::invalid(key, "export has no sql to render"))
        })?;

        let mut params = validated.params().clone();
        params.insert(
            MAX_ROWS_PARAM.to_string(),
            ParamValue::from(validated.max_rows()),
        );
        let include_header = definition.columns().is_empty();
        println!("{}", build_copy_sql(&render(sql, &params), include_header));
        Ok(())
    }

    /// Handle config subcommand
    ///
    /// # Arguments
    /// * `show` - Whether to show configuration
    /// * `validate` - Whether to validate configuration
    ///
    /// # Returns
    /// * `Result<()>` - Success or error
    fn handle_config_command(&self, show: bool, validate: bool) -> Result<()> {
        if validate {
            self.validate_config()?;
        }

        if show || !validate {
            self.show_config()?;
        }

        Ok(())
    }

    /// Validate settings and build the registry so every definition is checked
    fn validate_config(&self) -> Result<()> {
        println!("Validating configuration: {}", self.get_config_path().display());
        self.config.validate()?;
        let registry = self.config.build_registry(ProviderRegistry::new())?;
        println!("Configuration is valid ({} exports)", registry.len());
        Ok(())
    }

    /// Show effective configuration
    fn show_config(&self) -> Result<()> {
        println!("Configuration file: {}", self.get_config_path().display());
        println!();
        println!("{}", self.config.to_redacted_toml()?);
        Ok(())
    }

    /// Get configuration file path (from args or default)
    fn get_config_path(&self) -> PathBuf {
        self.args
            .config_file
            .clone()
            .unwrap_or_else(Config::default_path)
    }

    /// Show version information
    fn show_version(&self) {
        println!("copyexport version {}", env!("CARGO_PKG_VERSION"));
        println!("Rust version: {}", env!("CARGO_PKG_RUST_VERSION"));
    }
}

async fn stream_and_flush<W>(
    service: &ExportService,
    key: &str,
    raw: &RawParams,
    writer: &mut W,
) -> Result<Option<u64>>
where
    W: AsyncWrite + Unpin + Send,
{
    let rows = service.stream_csv(key, raw, &mut *writer).await?;
    writer.flush().await?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_args_parsing() {
        let args = CliArgs::try_parse_from(["copyexport", "list"]).unwrap();
        assert!(matches!(args.command, Commands::List { keys: false }));
        assert!(args.config_file.is_none());
    }

    #[test]
    fn test_run_args() {
        let args = CliArgs::try_parse_from([
            "copyexport",
            "-c",
            "/etc/copyexport.toml",
            "run",
            "library_books",
            "-p",
            "status=loaned",
            "-p",
            "id=1",
            "-p",
            "id=2",
            "--max-rows",
            "10",
            "-o",
            "/tmp",
            "-v",
        ])
        .unwrap();

        assert_eq!(args.config_file, Some(PathBuf::from("/etc/copyexport.toml")));
        assert!(args.verbose);
        let Commands::Run {
            key,
            params,
            max_rows,
            output,
        } = args.command
        else {
            panic!("expected run");
        };
        assert_eq!(key, "library_books");
        assert_eq!(params.len(), 3);
        assert_eq!(max_rows.as_deref(), Some("10"));
        assert_eq!(output, Some(PathBuf::from("/tmp")));

        let raw = raw_params(&params, max_rows.as_deref());
        assert_eq!(raw["id"], vec!["1", "2"]);
        assert_eq!(raw["status"], vec!["loaned"]);
        assert_eq!(raw[MAX_ROWS_PARAM], vec!["10"]);
    }

    #[test]
    fn test_parse_param() {
        assert_eq!(
            parse_param("q=a=b").unwrap(),
            ("q".to_string(), "a=b".to_string())
        );
        assert_eq!(parse_param("blank=").unwrap().1, "");
        assert!(parse_param("novalue").is_err());
        assert!(parse_param("=x").is_err());
        assert!(CliArgs::try_parse_from(["copyexport", "run", "k", "-p", "oops"]).is_err());
    }

    #[test]
    fn test_logging_args() {
        let args = CliArgs::try_parse_from(["copyexport", "--vv", "version"]).unwrap();
        let mut config = Config::default();
        CliInterface::apply_logging_args(&mut config, &args);
        assert_eq!(config.logging.level, LogLevel::Trace);

        let args = CliArgs::try_parse_from(["copyexport", "-q", "version"]).unwrap();
        let mut config = Config::default();
        CliInterface::apply_logging_args(&mut config, &args);
        assert_eq!(config.logging.level, LogLevel::Error);

        let args = CliArgs::try_parse_from(["copyexport", "version"]).unwrap();
        let mut config = Config::default();
        CliInterface::apply_logging_args(&mut config, &args);
        assert_eq!(config.logging.level, LogLevel::Warn);
    }

    #[test]
    fn test_log_filter_precedence() {
        let cli = |argv: &[&str]| {
            let args = CliArgs::try_parse_from(argv).unwrap();
            let mut config = Config::default();
            CliInterface::apply_logging_args(&mut config, &args);
            CliInterface { args, config }
        };

        let plain = cli(&["copyexport", "version"]);
        assert_eq!(plain.log_filter(None).max_level_hint(), Some(LevelFilter::WARN));
        assert_eq!(
            plain.log_filter(Some("copyexport=trace")).max_level_hint(),
            Some(LevelFilter::TRACE)
        );
        assert_eq!(plain.log_filter(Some("  ")).max_level_hint(), Some(LevelFilter::WARN));

        let verbose = cli(&["copyexport", "-v", "version"]);
        assert_eq!(
            verbose.log_filter(Some("error")).max_level_hint(),
            Some(LevelFilter::DEBUG)
        );
    }

    #[test]
    fn test_render_uses_configured_sql() {
        let config = Config::from_toml(
            "test",
            r#"
[database]
url = "host=localhost user=postgres"

[exports.definitions.books]
provider = "sql"
sql = "select * from books where title = :title limit :maxRows;"
maxRows = 20
params = [{ name = "title", type = "STRING" }]
"#,
        )
        .unwrap();
        let args =
            CliArgs::try_parse_from(["copyexport", "render", "books", "-p", "title=O'Hara"]).unwrap();
        let cli = CliInterface { args, config };

        let raw = raw_params(&[("title".to_string(), "O'Hara".to_string())], None);
        cli.render_sql("books", &raw).unwrap();
        assert!(cli.render_sql("missing", &raw).is_err());
    }
}
