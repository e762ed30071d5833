// SPDX-License-Identifier: GPL-3.0-or-later

//! This module contains the command line interface of the application.
//!
//! The command line parsing is implemented using the `clap` library.
//! The module is defining types to represent a structured form of the
//! program invocation. The `Arguments` type is used to represent all
//! possible invocations of the program.

use clap::{ArgAction, ArgMatches, Command, arg, command, value_parser};
use std::fmt;

/// Common constants used in the module.
const DEFAULT_BUILD_PATH: &str = ".";

/// Represents the command line arguments of the application.
#[derive(Debug, PartialEq)]
pub struct Arguments {
    // The path of the configuration file.
    pub config: Option<String>,
    // The directory where the compilation database is.
    pub build_path: String,
    // The analyzer name or path, overrides the configuration.
    pub analyzer: Option<String>,
    // Arguments passed to the analyzer as they are.
    pub analyzer_arguments: Vec<String>,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub debug: bool,
    pub verbose: bool,
    pub jobs: Option<usize>,
    // The report file, standard output when not given.
    pub output: Option<String>,
}

impl TryFrom<ArgMatches> for Arguments {
    type Error = anyhow::Error;

    fn try_from(matches: ArgMatches) -> Result<Self, Self::Error> {
        let strings = |id: &str| -> Vec<String> {
            matches.get_many::<String>(id).map(|values| values.cloned().collect()).unwrap_or_default()
        };

        let arguments = Arguments {
            config: matches.get_one::<String>("config").cloned(),
            build_path: matches
                .get_one::<String>("build-path")
                .cloned()
                .unwrap_or_else(|| DEFAULT_BUILD_PATH.to_string()),
            analyzer: matches.get_one::<String>("analyzer").cloned(),
            analyzer_arguments: strings("ANALYZER_ARGS"),
            include: strings("include"),
            exclude: strings("exclude"),
            debug: matches.get_flag("debug"),
            verbose: matches.get_count("verbose") > 0,
            jobs: matches.get_one::<usize>("jobs").copied(),
            output: matches.get_one::<String>("output").cloned(),
        };
        Ok(arguments)
    }
}

impl fmt::Display for Arguments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Arguments:")?;
        writeln!(f, "  config: {:?}", self.config)?;
        writeln!(f, "  build path: {}", self.build_path)?;
        writeln!(f, "  analyzer: {:?}", self.analyzer)?;
        writeln!(f, "  analyzer arguments: {:?}", self.analyzer_arguments)?;
        writeln!(f, "  include: {:?}", self.include)?;
        writeln!(f, "  exclude: {:?}", self.exclude)?;
        writeln!(f, "  debug: {}, verbose: {}", self.debug, self.verbose)?;
        writeln!(f, "  jobs: {:?}", self.jobs)?;
        write!(f, "  output: {:?}", self.output)
    }
}

/// Represents the command line interface of the application.
///
/// This describes how the user can interact with the application.
/// Everything after the `--` separator is passed to the analyzer.
pub fn cli() -> Command {
    command!()
        .about("Runs a static analyzer on every source file of a compilation database")
        .args(&[
            arg!(-v --verbose ... "Prints the analyzer command lines").action(ArgAction::Count),
            arg!(-c --config <FILE> "Path of the config file"),
            arg!(-p --"build-path" <DIR> "Directory where the compile_commands.json is")
                .default_value(DEFAULT_BUILD_PATH)
                .hide_default_value(false),
            arg!(--analyzer <PATH> "Name or path of the analyzer executable"),
            arg!(--include <REGEX> "Analyze only the files matching this pattern")
                .action(ArgAction::Append),
            arg!(--exclude <REGEX> "Skip the files matching this pattern").action(ArgAction::Append),
            arg!(--debug "Pass the debug flag to the analyzer").action(ArgAction::SetTrue),
            arg!(-j --jobs <N> "Number of analyzer processes to run in parallel")
                .value_parser(value_parser!(usize)),
            arg!(-o --output <FILE> "Path of the report file"),
            arg!([ANALYZER_ARGS] ... "Arguments passed to the analyzer")
                .action(ArgAction::Append)
                .num_args(0..)
                .last(true),
        ])
}
