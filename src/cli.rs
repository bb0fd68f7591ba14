use anyhow::{Result, bail};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::archive::config::{BackendKind, ConfigOverrides};
use crate::commands::{self, CommandReport};
use crate::logging;

#[derive(Debug, Parser)]
#[command(
    name = "safran-archive",
    about = "Merge SAFRAN extracts into a cumulative archive and retire superseded versions",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Raise log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(
        short = 'v',
        long = "verbose",
        action = clap::ArgAction::Count,
        global = true
    )]
    pub verbose: u8,

    /// Print the command report as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(flatten)]
    pub overrides: OverrideArgs,
}

#[derive(Debug, Clone, Args)]
pub struct OverrideArgs {
    /// Archive directory (default: $SAFRAN_HOME/output)
    #[arg(long, global = true)]
    pub archive_dir: Option<PathBuf>,

    /// Directory holding freshly converted files (default: $SAFRAN_HOME/convert)
    #[arg(long, global = true)]
    pub converted_dir: Option<PathBuf>,

    /// Grid tooling: nco or json
    #[arg(long, global = true)]
    pub backend: Option<BackendKind>,

    /// Upper bound on variables merged at once
    #[arg(long, global = true)]
    pub concurrency: Option<usize>,
}

impl From<&OverrideArgs> for ConfigOverrides {
    fn from(args: &OverrideArgs) -> Self {
        Self {
            archive_dir: args.archive_dir.clone(),
            converted_dir: args.converted_dir.clone(),
            concurrency_limit: args.concurrency,
            backend: args.backend,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run one merge cycle (historical, previous, latest) followed by a sweep
    Merge {
        /// Converted files to ingest; every file in the converted dir when empty
        files: Vec<PathBuf>,

        /// Leave superseded versions in place
        #[arg(long)]
        no_sweep: bool,

        /// Write the merged files and their labels to this JSON file
        #[arg(long)]
        publish_list: Option<PathBuf>,
    },
    /// Delete superseded versions, keeping the newest end date per variable and category
    Sweep {
        /// Directory to sweep (default: the archive dir)
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Extension to consider, repeatable, e.g. `--ext csv.gz --ext nc`
        /// (default: [retention] extensions, else the dataset extension)
        #[arg(long = "ext", value_name = "EXT")]
        extensions: Vec<String>,

        /// Report what would be removed without deleting anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Show configuration, current members, and manifest consistency
    Status,
    /// List the current members with their publish labels
    PublishList {
        /// Write the list as JSON to this path
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

fn print_report(report: &CommandReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        print!("{}", report.render_text());
    }
    Ok(())
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let overrides = ConfigOverrides::from(&cli.overrides);
    let report = match cli.command {
        Command::Merge {
            files,
            no_sweep,
            publish_list,
        } => commands::merge::run(&commands::merge::MergeOptions {
            files,
            no_sweep,
            publish_list,
            overrides,
        })?,
        Command::Sweep {
            dir,
            extensions,
            dry_run,
        } => commands::sweep::run(&commands::sweep::SweepCommandOptions {
            dir,
            extensions,
            dry_run,
            overrides,
        })?,
        Command::Status => commands::status::run(&overrides)?,
        Command::PublishList { out } => commands::publish_list::run(out.as_ref(), &overrides)?,
    };

    print_report(&report, cli.json)?;
    if !report.ok {
        bail!(
            "{} reported {} issue(s)",
            report.command,
            report.issues.len()
        );
    }
    Ok(())
}
