pub mod input;
pub mod output;
pub mod runner;

use clap::{value_parser, Arg, ArgAction, Command, ValueHint};

use crate::input::Step;

pub fn command() -> Command {
    Command::new("sigil")
        .version(clap::crate_version!())
        .about("Generate identifying transition assays and decoys for targeted proteomics")
        .arg(
            Arg::new("parameters")
                .required(true)
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help("Path to configuration parameters (JSON file)")
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("experiment")
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help(
                    "Path to the targeted experiment (JSON file). Overrides the \
                     experiment listed in the configuration file.",
                )
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("output_directory")
                .short('o')
                .long("output_directory")
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help(
                    "Path where the transition list and report will be written. \
                     Overrides the directory specified in the configuration file.",
                )
                .value_hint(ValueHint::DirPath),
        )
        .arg(
            Arg::new("steps")
                .long("steps")
                .num_args(1..)
                .value_delimiter(',')
                .value_parser(|s: &str| s.parse::<Step>())
                .help("Stages to run, in order: reannotate, restrict, detecting, uis"),
        )
        .arg(
            Arg::new("seed")
                .long("seed")
                .allow_negative_numbers(true)
                .value_parser(value_parser!(i64))
                .help("Decoy shuffle seed (-1 = derive from the clock)"),
        )
        .arg(
            Arg::new("no-decoys")
                .long("no-decoys")
                .action(ArgAction::SetTrue)
                .help("Generate identifying transitions without decoys"),
        )
        .help_template(
            "{usage-heading} {usage}\n\n\
             {about-with-newline}\n\
             Version {version}\n\n\
             {all-args}{after-help}",
        )
}
