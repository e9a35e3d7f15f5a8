//! Configuration loading helpers.
//!
//! Flags owned by `ponder-config` are routed to `ortho_config`; everything
//! else is left for the command-line parser.

use std::ffi::OsString;

use ortho_config::OrthoConfig;
use ponder_config::Config;

use crate::errors::AppError;

/// Flags recognised by the configuration loader. Each one takes a value,
/// either inline (`--workers=4`) or as the next argument.
///
/// Keep in sync with the fields of [`Config`].
const CONFIG_CLI_FLAGS: &[&str] = &[
    "--config-path",
    "--engine-path",
    "--engine-args",
    "--workers",
    "--movetime-ms",
    "--depth",
    "--retries",
    "--exchange-timeout-ms",
    "--log-filter",
    "--log-format",
];

pub(crate) trait ConfigLoader {
    /// Loads configuration from the program name followed by config flags.
    fn load(&self, args: &[OsString]) -> Result<Config, AppError>;
}

pub(crate) struct OrthoConfigLoader;

impl ConfigLoader for OrthoConfigLoader {
    fn load(&self, args: &[OsString]) -> Result<Config, AppError> {
        Config::load_from_iter(args.iter().cloned()).map_err(AppError::LoadConfiguration)
    }
}

/// Arguments split between the configuration loader and the CLI parser.
/// Both halves start with the program name.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct ArgumentSplit {
    pub(crate) config_arguments: Vec<OsString>,
    pub(crate) cli_arguments: Vec<OsString>,
}

pub(crate) fn split_arguments(args: &[OsString]) -> ArgumentSplit {
    let mut split = ArgumentSplit::default();
    let mut remaining = args.iter();
    if let Some(program) = remaining.next() {
        split.config_arguments.push(program.clone());
        split.cli_arguments.push(program.clone());
    }

    let mut positional_only = false;
    while let Some(argument) = remaining.next() {
        if positional_only {
            split.cli_arguments.push(argument.clone());
            continue;
        }
        if argument.as_os_str() == "--" {
            positional_only = true;
            split.cli_arguments.push(argument.clone());
            continue;
        }

        let text = argument.to_string_lossy();
        let (flag, inline_value) = match text.split_once('=') {
            Some((name, _)) => (name, true),
            None => (text.as_ref(), false),
        };
        if !CONFIG_CLI_FLAGS.contains(&flag) {
            split.cli_arguments.push(argument.clone());
            continue;
        }

        split.config_arguments.push(argument.clone());
        if !inline_value {
            if let Some(value) = remaining.next() {
                split.config_arguments.push(value.clone());
            }
        }
    }
    split
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn os(args: &[&str]) -> Vec<OsString> {
        args.iter().map(OsString::from).collect()
    }

    #[rstest]
    #[case::empty(&[], &[], &[])]
    #[case::only_positions(&["ponder", "8/8/8 w"], &["ponder"], &["ponder", "8/8/8 w"])]
    #[case::separate_value(
        &["ponder", "--workers", "3", "fen"],
        &["ponder", "--workers", "3"],
        &["ponder", "fen"],
    )]
    #[case::inline_value(
        &["ponder", "--log-format=compact", "--help"],
        &["ponder", "--log-format=compact"],
        &["ponder", "--help"],
    )]
    #[case::after_separator(
        &["ponder", "--", "--depth"],
        &["ponder"],
        &["ponder", "--", "--depth"],
    )]
    fn arguments_are_routed_by_owner(
        #[case] args: &[&str],
        #[case] config: &[&str],
        #[case] cli: &[&str],
    ) {
        let split = split_arguments(&os(args));

        assert_eq!(split.config_arguments, os(config));
        assert_eq!(split.cli_arguments, os(cli));
    }
}
