//! CLI argument definitions for the quarantine audit.
//!
//! Flags override the values read from the configuration file, which in
//! turn override the built-in defaults.

use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use npm_quarantine::config::{coerce_concurrency, coerce_minutes};
use npm_quarantine::{ConfigError, QuarantineConfig, UpstreamBase};
use std::time::Duration;

/// Audit package.json dependencies against the npm quarantine window.
#[derive(Parser, Debug, Clone)]
#[command(name = "npm-quarantine-audit")]
#[command(version, about)]
#[command(long_about = concat!(
    "Audit package.json dependencies against the npm quarantine window.\n\n",
    "Each dependency range is resolved against the versions the registry ",
    "publishes, the way `npm install` would resolve it. A resolved version ",
    "published more recently than the quarantine window is reported, together ",
    "with the newest version that is already old enough.\n\n",
    "With --fix, quarantined dependencies are pinned to that safe version in ",
    "package.json so a quarantining registry proxy cannot fail the install ",
    "with ETARGET. A range is left alone when the lockfile already holds the ",
    "safe version.",
))]
#[command(after_help = concat!(
    "CONFIGURATION:\n",
    "  Settings are read from the TOML file given with --config. Flags take\n",
    "  precedence over the file.\n\n",
    "EXAMPLES:\n",
    "  Audit the project in the current directory:\n",
    "    $ npm-quarantine-audit\n\n",
    "  Pin quarantined dependencies to their safe versions:\n",
    "    $ npm-quarantine-audit --fix\n\n",
    "  Pin but keep the ^/~ operator of each range:\n",
    "    $ npm-quarantine-audit --fix --prefix\n\n",
    "  Use a one-week window and emit JSON:\n",
    "    $ npm-quarantine-audit --minutes 10080 --json\n",
))]
pub struct Cli {
    /// Rewrite package.json to avoid quarantined versions.
    #[arg(long)]
    pub fix: bool,

    /// Keep the range operator (^ or ~) when pinning.
    #[arg(long, requires = "fix")]
    pub prefix: bool,

    /// Output the report in JSON format for scripting.
    #[arg(long)]
    pub json: bool,

    /// Project directory containing package.json [default: current directory].
    #[arg(short, long, value_name = "DIR")]
    pub dir: Option<Utf8PathBuf>,

    /// Configuration file.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<Utf8PathBuf>,

    /// Quarantine window in minutes.
    #[arg(long, value_name = "N", allow_negative_numbers = true)]
    pub minutes: Option<f64>,

    /// Registry to fetch metadata from.
    #[arg(long, value_name = "URL")]
    pub upstream: Option<String>,

    /// Maximum number of registry requests in flight.
    #[arg(long, value_name = "N")]
    pub concurrency: Option<usize>,

    /// Timeout for each registry request, in seconds.
    #[arg(long, value_name = "SECS")]
    pub timeout_secs: Option<u64>,

    /// Only report problems, not safe dependencies.
    #[arg(short, long)]
    pub quiet: bool,
}

impl Default for Cli {
    /// Creates a `Cli` instance with every flag unset.
    ///
    /// # Examples
    ///
    /// ```
    /// use npm_quarantine_audit::cli::Cli;
    ///
    /// let cli = Cli::default();
    /// assert!(!cli.fix);
    /// assert!(cli.config.is_none());
    /// ```
    fn default() -> Self {
        Self {
            fix: false,
            prefix: false,
            json: false,
            dir: None,
            config: None,
            minutes: None,
            upstream: None,
            concurrency: None,
            timeout_secs: None,
            quiet: false,
        }
    }
}

impl Cli {
    /// The project directory to audit.
    #[must_use]
    pub fn project_dir(&self) -> &Utf8Path {
        self.dir.as_deref().unwrap_or_else(|| Utf8Path::new("."))
    }

    /// Loads the configuration file, if any, and applies flag overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be loaded or `--upstream`
    /// is not a usable registry URL.
    ///
    /// # Examples
    ///
    /// ```
    /// use npm_quarantine_audit::cli::Cli;
    ///
    /// let cli = Cli {
    ///     minutes: Some(-3.0),
    ///     concurrency: Some(2),
    ///     ..Cli::default()
    /// };
    /// let config = cli.resolve_config().expect("defaults load");
    /// assert_eq!(config.threshold.minutes(), 0);
    /// assert_eq!(config.audit.concurrency, 2);
    /// ```
    pub fn resolve_config(&self) -> Result<QuarantineConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => QuarantineConfig::load_from(path)?,
            None => QuarantineConfig::default(),
        };
        if let Some(minutes) = self.minutes {
            config.threshold = coerce_minutes(minutes);
        }
        if let Some(upstream) = &self.upstream {
            config.upstream = UpstreamBase::parse(upstream)?;
        }
        if let Some(concurrency) = self.concurrency {
            config.audit.concurrency = coerce_concurrency(concurrency);
        }
        if let Some(secs) = self.timeout_secs {
            config.audit.timeout = Duration::from_secs(secs);
        }
        config.audit.prefix |= self.prefix;
        Ok(config)
    }
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
