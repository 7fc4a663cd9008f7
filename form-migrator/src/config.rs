//! Configuration for the form migrator
//!
//! CLI arguments and environment variable handling using clap, plus the
//! run settings the reconciler consumes.

use clap::{Parser, Subcommand};
use std::time::Duration;

use helpdesk_client::AccountConfig;

use crate::mapping::DuplicateTitlePolicy;
use crate::resolver::CustomObjectGate;

/// Form migrator - copies ticket forms between helpdesk accounts
#[derive(Parser, Debug, Clone)]
#[command(name = "form-migrator")]
#[command(about = "Copy ticket forms between helpdesk accounts, re-mapping field ids")]
pub struct Args {
    /// Source account subdomain
    #[arg(long, env = "SOURCE_SUBDOMAIN")]
    pub source_subdomain: Option<String>,

    /// Source account agent email
    #[arg(long, env = "SOURCE_EMAIL")]
    pub source_email: Option<String>,

    /// Source account API token
    #[arg(long, env = "SOURCE_TOKEN", hide_env_values = true)]
    pub source_token: Option<String>,

    /// Target account subdomain
    #[arg(long, env = "TARGET_SUBDOMAIN")]
    pub target_subdomain: Option<String>,

    /// Target account agent email
    #[arg(long, env = "TARGET_EMAIL")]
    pub target_email: Option<String>,

    /// Target account API token
    #[arg(long, env = "TARGET_TOKEN", hide_env_values = true)]
    pub target_token: Option<String>,

    /// Verbose logging (overrides LOG_LEVEL)
    #[arg(long, env = "DEBUG", default_value = "false")]
    pub debug: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Request timeout in seconds
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value = "30")]
    pub request_timeout_secs: u64,

    /// Minimum spacing between writes to the target, in milliseconds
    #[arg(long, env = "WRITE_INTERVAL_MS", default_value = "1000")]
    pub write_interval_ms: u64,

    /// Writes allowed back to back before spacing applies
    #[arg(long, env = "WRITE_BURST", default_value = "1")]
    pub write_burst: u32,

    /// Retries per write after a rate-limit response
    #[arg(long, env = "RATE_LIMIT_RETRIES", default_value = "1")]
    pub rate_limit_retries: u32,

    /// Fail when a custom field title is not unique instead of using the first match
    #[arg(long, env = "STRICT_TITLES", default_value = "false")]
    pub strict_titles: bool,

    /// Skip lookup fields whose custom object cannot be made available
    #[arg(long, env = "REQUIRE_CUSTOM_OBJECTS", default_value = "false")]
    pub require_custom_objects: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List the ticket forms of an account
    ListForms {
        /// List the target account instead of the source
        #[arg(long)]
        target: bool,
    },
    /// Migrate one ticket form from source to target
    Migrate {
        /// Source form id
        form_id: u64,

        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },
}

impl Args {
    /// Validate configuration
    ///
    /// Reports every missing credential variable by name.
    pub fn validate(&self) -> Result<(), String> {
        let required = [
            ("SOURCE_SUBDOMAIN", &self.source_subdomain),
            ("SOURCE_EMAIL", &self.source_email),
            ("SOURCE_TOKEN", &self.source_token),
            ("TARGET_SUBDOMAIN", &self.target_subdomain),
            ("TARGET_EMAIL", &self.target_email),
            ("TARGET_TOKEN", &self.target_token),
        ];

        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| value.as_deref().map_or(true, |v| v.trim().is_empty()))
            .map(|(name, _)| *name)
            .collect();

        if !missing.is_empty() {
            return Err(format!(
                "missing required environment variables: {}",
                missing.join(", ")
            ));
        }

        if self.write_burst == 0 {
            return Err("WRITE_BURST must be at least 1".to_string());
        }

        Ok(())
    }

    pub fn source_account(&self) -> AccountConfig {
        self.account(&self.source_subdomain, &self.source_email, &self.source_token)
    }

    pub fn target_account(&self) -> AccountConfig {
        self.account(&self.target_subdomain, &self.target_email, &self.target_token)
    }

    fn account(
        &self,
        subdomain: &Option<String>,
        email: &Option<String>,
        token: &Option<String>,
    ) -> AccountConfig {
        AccountConfig {
            timeout_secs: self.request_timeout_secs,
            ..AccountConfig::new(
                subdomain.clone().unwrap_or_default(),
                email.clone().unwrap_or_default(),
                token.clone().unwrap_or_default(),
            )
        }
    }

    /// Run settings derived from the arguments
    pub fn migrator_config(&self) -> MigratorConfig {
        MigratorConfig {
            write_interval: Duration::from_millis(self.write_interval_ms),
            write_burst: self.write_burst,
            rate_limit_retries: self.rate_limit_retries,
            duplicate_titles: if self.strict_titles {
                DuplicateTitlePolicy::Reject
            } else {
                DuplicateTitlePolicy::FirstMatch
            },
            custom_object_gate: if self.require_custom_objects {
                CustomObjectGate::Required
            } else {
                CustomObjectGate::BestEffort
            },
        }
    }

    /// Default tracing filter when RUST_LOG is unset
    pub fn log_filter(&self) -> String {
        let level = if self.debug { "debug" } else { self.log_level.as_str() };
        format!("form_migrator={level},helpdesk_client={level},warn")
    }
}

/// Settings for one reconciler
#[derive(Debug, Clone)]
pub struct MigratorConfig {
    /// Spacing between writes to the target
    pub write_interval: Duration,
    /// Writes allowed back to back
    pub write_burst: u32,
    /// Retries per write after a rate-limit response
    pub rate_limit_retries: u32,
    pub duplicate_titles: DuplicateTitlePolicy,
    pub custom_object_gate: CustomObjectGate,
}

impl Default for MigratorConfig {
    fn default() -> Self {
        Self {
            write_interval: Duration::from_secs(1),
            write_burst: 1,
            rate_limit_retries: 1,
            duplicate_titles: DuplicateTitlePolicy::default(),
            custom_object_gate: CustomObjectGate::default(),
        }
    }
}

impl MigratorConfig {
    /// Same settings with write spacing turned off
    pub fn without_pacing(mut self) -> Self {
        self.write_interval = Duration::ZERO;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(args).unwrap()
    }

    fn with_credentials(extra: &[&str]) -> Vec<String> {
        let mut args: Vec<String> = [
            "form-migrator",
            "--source-subdomain",
            "acme",
            "--source-email",
            "admin@acme.test",
            "--source-token",
            "s3cret",
            "--target-subdomain",
            "acme-sandbox",
            "--target-email",
            "admin@acme.test",
            "--target-token",
            "t0ken",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        args.extend(extra.iter().map(|s| s.to_string()));
        args
    }

    #[test]
    fn test_migrate_subcommand() {
        let args = Args::try_parse_from(with_credentials(&["migrate", "360001", "--json"])).unwrap();

        assert_eq!(
            args.command,
            Command::Migrate {
                form_id: 360001,
                json: true
            }
        );
        assert!(args.validate().is_ok());
        assert_eq!(args.source_account().subdomain, "acme");
        assert_eq!(args.target_account().base_url(), "https://acme-sandbox.zendesk.com/api/v2");
        assert_eq!(args.target_account().timeout_secs, 30);
    }

    #[test]
    fn test_validate_names_missing_variables() {
        let args = parse(&["form-migrator", "--source-subdomain", "acme", "list-forms"]);

        let err = args.validate().unwrap_err();
        assert!(err.contains("SOURCE_EMAIL"));
        assert!(err.contains("TARGET_TOKEN"));
        assert!(!err.contains("SOURCE_SUBDOMAIN"));
    }

    #[test]
    fn test_policies_from_flags() {
        let args = Args::try_parse_from(with_credentials(&[
            "--strict-titles",
            "--require-custom-objects",
            "--write-interval-ms",
            "250",
            "list-forms",
            "--target",
        ]))
        .unwrap();

        let config = args.migrator_config();
        assert_eq!(config.duplicate_titles, DuplicateTitlePolicy::Reject);
        assert_eq!(config.custom_object_gate, CustomObjectGate::Required);
        assert_eq!(config.write_interval, Duration::from_millis(250));
        assert_eq!(args.command, Command::ListForms { target: true });
    }

    #[test]
    fn test_debug_flag_overrides_log_level() {
        let args = Args::try_parse_from(with_credentials(&["--debug", "list-forms"])).unwrap();
        assert!(args.log_filter().starts_with("form_migrator=debug"));

        let args = Args::try_parse_from(with_credentials(&["--log-level", "warn", "list-forms"])).unwrap();
        assert!(args.log_filter().starts_with("form_migrator=warn"));
    }
}
