use anyhow::Result;
use clap::Parser;
use colored::Colorize;

use crmlink::cli::args::{Cli, Commands};
use crmlink::cli::commands;
use crmlink::error::CrmLinkError;

fn main() {
    if let Err(e) = run() {
        eprintln!("{}: {}", "error".red().bold(), e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), CrmLinkError> {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(if cli.debug {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Warn
        })
        .init();

    let format = cli.output;

    let output = match cli.command {
        Commands::Plan(args) => commands::plan(&args, format)?,
        Commands::ArchivePlan(args) => commands::archive_plan(&args, format)?,
        Commands::Config(args) => commands::config(args.command, format)?,
    };

    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}
