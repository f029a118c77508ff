use std::time::Duration;

use clap::{ArgMatches, CommandFactory, FromArgMatches, parser::ValueSource};
use hysetter_core::RunSettings;

use crate::cli::Args;

/// Which run knobs were given explicitly on the command line.
///
/// Only those override the config's `settings` block; clap defaults do not.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct CliValueSources {
    pub(crate) concurrency: bool,
    pub(crate) max_retries: bool,
    pub(crate) rate_limit: bool,
}

pub(crate) fn parse_cli_with_sources() -> (Args, CliValueSources) {
    let command = Args::command();
    let matches = command.get_matches();
    let args = Args::from_arg_matches(&matches).unwrap_or_else(|err| err.exit());
    (args, sources_from_matches(&matches))
}

fn sources_from_matches(matches: &ArgMatches) -> CliValueSources {
    CliValueSources {
        concurrency: is_commandline_value(matches, "concurrency"),
        max_retries: is_commandline_value(matches, "max_retries"),
        rate_limit: is_commandline_value(matches, "rate_limit"),
    }
}

fn is_commandline_value(matches: &ArgMatches, id: &str) -> bool {
    matches.value_source(id) == Some(ValueSource::CommandLine)
}

/// Applies explicit CLI values on top of the resolved file settings.
pub(crate) fn apply_cli_overrides(
    mut settings: RunSettings,
    args: &Args,
    cli_sources: &CliValueSources,
) -> RunSettings {
    if cli_sources.concurrency {
        settings.concurrency = usize::from(args.concurrency);
    }
    if cli_sources.max_retries {
        settings.max_retries = u32::from(args.max_retries);
    }
    if cli_sources.rate_limit {
        settings.rate_limit = Duration::from_millis(args.rate_limit);
    }
    settings
}

/// Priority: `RUST_LOG` > quiet flag > verbose flag > default (info).
pub(crate) fn resolve_default_log_level(args: &Args) -> &'static str {
    if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use hysetter_core::config::Settings;

    fn parse(argv: &[&str]) -> (Args, CliValueSources) {
        let matches = Args::command().try_get_matches_from(argv).unwrap();
        let args = Args::from_arg_matches(&matches).unwrap();
        (args, sources_from_matches(&matches))
    }

    #[test]
    fn test_defaults_do_not_override_file_settings() {
        let (args, sources) = parse(&["hysetter", "c.yml"]);
        assert!(!sources.concurrency && !sources.max_retries && !sources.rate_limit);

        let file = Settings {
            concurrency: Some(2),
            rate_limit_ms: Some(1000),
            ..Settings::default()
        };
        let resolved = apply_cli_overrides(RunSettings::from_settings(Some(&file)), &args, &sources);
        assert_eq!(resolved.concurrency, 2);
        assert_eq!(resolved.rate_limit, Duration::from_millis(1000));
    }

    #[test]
    fn test_explicit_flags_override_file_settings() {
        let (args, sources) = parse(&["hysetter", "c.yml", "-c", "8", "-r", "5", "-l", "0"]);
        let file = Settings {
            concurrency: Some(2),
            max_retries: Some(1),
            rate_limit_ms: Some(1000),
            ..Settings::default()
        };
        let resolved = apply_cli_overrides(RunSettings::from_settings(Some(&file)), &args, &sources);
        assert_eq!(resolved.concurrency, 8);
        assert_eq!(resolved.max_retries, 5);
        assert_eq!(resolved.rate_limit, Duration::ZERO);
    }

    #[test]
    fn test_default_log_level() {
        assert_eq!(resolve_default_log_level(&parse(&["hysetter", "c.yml"]).0), "info");
        assert_eq!(resolve_default_log_level(&parse(&["hysetter", "c.yml", "-v"]).0), "debug");
        assert_eq!(resolve_default_log_level(&parse(&["hysetter", "c.yml", "-vvv"]).0), "trace");
        assert_eq!(
            resolve_default_log_level(&parse(&["hysetter", "c.yml", "-q", "-v"]).0),
            "error"
        );
    }
}
