use anyhow::Result;
use clap::{Arg, ArgAction, Command};
use std::path::PathBuf;

use sheetmon::commands;

fn build_cli() -> Command {
    Command::new("sheetmon")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Samples host metrics and directory sizes and appends them to a Google Sheet")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("PATH")
                .help("Config file to use instead of the default location")
                .value_parser(clap::value_parser!(PathBuf))
                .global(true),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable debug logging")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .subcommand(
            Command::new("run")
                .about("Start monitoring and uploading until interrupted")
                .long_about(
                    "Start monitoring and uploading until interrupted\n\n\
                     Signals (Unix):\n    \
                     SIGHUP     Reload the config file\n    \
                     SIGUSR1    Toggle pause/resume\n    \
                     SIGINT     Drain the upload queue and exit",
                )
                .arg(
                    Arg::new("dry-run")
                        .long("dry-run")
                        .help("Print rows to stdout instead of uploading them")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("sample")
                .about("Collect one sample and print it as JSON")
                .arg(
                    Arg::new("row")
                        .long("row")
                        .help("Print the spreadsheet row instead of the full sample")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("human")
                        .long("human")
                        .help("Print a human-readable summary")
                        .action(ArgAction::SetTrue)
                        .conflicts_with("row"),
                ),
        )
        .subcommand(Command::new("check").about("Validate the config and test the sheet connection"))
        .subcommand(
            Command::new("config")
                .about("Manage configuration (use 'sheetmon config --help' for subcommands)")
                .subcommand_required(true)
                .arg_required_else_help(true)
                .subcommand(Command::new("path").about("Print the config file path"))
                .subcommand(Command::new("show").about("Print the current configuration"))
                .subcommand(
                    Command::new("init").about("Write a default config file").arg(
                        Arg::new("force")
                            .short('f')
                            .long("force")
                            .help("Overwrite an existing file")
                            .action(ArgAction::SetTrue),
                    ),
                )
                .subcommand(
                    Command::new("add-dir")
                        .about("Add a directory to monitor")
                        .arg(
                            Arg::new("path")
                                .help("Directory to monitor")
                                .required(true)
                                .index(1)
                                .value_parser(clap::value_parser!(PathBuf)),
                        ),
                )
                .subcommand(
                    Command::new("remove-dir")
                        .about("Stop monitoring a directory")
                        .arg(
                            Arg::new("path")
                                .help("Monitored directory to remove")
                                .required(true)
                                .index(1)
                                .value_parser(clap::value_parser!(PathBuf)),
                        ),
                )
                .subcommand(
                    Command::new("set-interval")
                        .about("Set the sampling interval")
                        .arg(
                            Arg::new("seconds")
                                .help("Seconds between samples")
                                .required(true)
                                .index(1)
                                .value_parser(clap::value_parser!(u64)),
                        ),
                ),
        )
}

fn main() -> Result<()> {
    let matches = build_cli().get_matches();

    sheetmon::init_logging(matches.get_flag("verbose"));

    match matches.subcommand() {
        Some(("run", sub_matches)) => commands::run(sub_matches),
        Some(("sample", sub_matches)) => commands::sample(sub_matches),
        Some(("check", sub_matches)) => commands::check(sub_matches),
        Some(("config", sub_matches)) => commands::config::execute(sub_matches),
        _ => {
            println!("Use 'sheetmon --help' for more information.");
            Ok(())
        }
    }
}
