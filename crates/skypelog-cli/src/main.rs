//! skypelog - A tool for dumping Skype .dbb chat history files
//!
//! Usage:
//!   skypelog <profile_dir>            - Dump all chat*.dbb logs in a profile
//!   skypelog dump <file>...           - Dump specific logs (`-` for stdin)
//!   skypelog list <profile_dir>       - List chat logs in a profile
//!   skypelog info <file>              - Show log information
//!   skypelog export <profile_dir> -o  - Export all records to JSON

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use skypelog::dbb_utils::{
    dump_logs, dump_profile, export_json, find_logs, list_logs, show_info, DumpOptions,
    DumpSummary, OutputFormat,
};
use skypelog::ScanOptions;

#[derive(Parser)]
#[command(name = "skypelog")]
#[command(version = "0.1.0")]
#[command(about = "Dump chat records from Skype .dbb chat history files", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to the Skype profile directory (for quick dump mode)
    profile_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(flatten)]
    scan: ScanArgs,
}

#[derive(Args, Clone, Copy)]
struct ScanArgs {
    /// Largest accepted gap between sender and message fields
    #[arg(long, global = true, default_value_t = skypelog::scanner::MAX_SENDER_GAP)]
    max_sender_gap: usize,
}

impl From<ScanArgs> for ScanOptions {
    fn from(args: ScanArgs) -> Self {
        ScanOptions {
            max_sender_gap: args.max_sender_gap,
            ..ScanOptions::default()
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
}

impl From<Format> for OutputFormat {
    fn from(f: Format) -> Self {
        match f {
            Format::Text => OutputFormat::Text,
            Format::Json => OutputFormat::JsonLines,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Dump records of specific log files
    Dump {
        /// Log files (`-` reads stdin)
        #[arg(required = true, num_args = 1..)]
        files: Vec<PathBuf>,
        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
        /// Show timestamps in UTC
        #[arg(long)]
        utc: bool,
    },
    /// Dump all chat logs of a profile directory
    Profile {
        /// Path to the profile directory
        profile_dir: PathBuf,
        /// File name pattern
        #[arg(short, long)]
        pattern: Option<String>,
        /// Search subdirectories
        #[arg(short, long)]
        recursive: bool,
        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
        /// Show timestamps in UTC
        #[arg(long)]
        utc: bool,
    },
    /// List chat logs in a profile directory
    List {
        /// Path to the profile directory
        profile_dir: PathBuf,
        /// File name pattern
        #[arg(short, long)]
        pattern: Option<String>,
        /// Search subdirectories
        #[arg(short, long)]
        recursive: bool,
    },
    /// Show log information
    Info {
        /// Path to the .dbb file
        file: PathBuf,
        /// Show timestamps in UTC
        #[arg(long)]
        utc: bool,
    },
    /// Export all records of a profile to a JSON file
    Export {
        /// Path to the profile directory
        profile_dir: PathBuf,
        /// Output JSON file
        #[arg(short, long, default_value = "skypelog.json")]
        output: PathBuf,
        /// File name pattern
        #[arg(short, long)]
        pattern: Option<String>,
        /// Search subdirectories
        #[arg(short, long)]
        recursive: bool,
    },
}

fn init_tracing(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .init();
}

fn exit_on_failures(summary: DumpSummary) {
    if summary.failed > 0 {
        std::process::exit(1);
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let scan: ScanOptions = cli.scan.into();

    match cli.command {
        Some(Commands::Dump { files, format, utc }) => {
            let options = DumpOptions {
                format: format.into(),
                utc,
                scan,
            };
            exit_on_failures(dump_logs(&files, &options)?);
        }
        Some(Commands::Profile {
            profile_dir,
            pattern,
            recursive,
            format,
            utc,
        }) => {
            let options = DumpOptions {
                format: format.into(),
                utc,
                scan,
            };
            exit_on_failures(dump_profile(
                &profile_dir,
                pattern.as_deref(),
                recursive,
                &options,
            )?);
        }
        Some(Commands::List {
            profile_dir,
            pattern,
            recursive,
        }) => {
            list_logs(&profile_dir, pattern.as_deref(), recursive)?;
        }
        Some(Commands::Info { file, utc }) => {
            show_info(&file, scan, utc)?;
        }
        Some(Commands::Export {
            profile_dir,
            output,
            pattern,
            recursive,
        }) => {
            let logs = find_logs(&profile_dir, pattern.as_deref(), recursive)?;
            exit_on_failures(export_json(&logs, &output, scan)?);
        }
        None => {
            // Quick dump mode
            if let Some(profile_dir) = cli.profile_dir {
                let options = DumpOptions {
                    scan,
                    ..DumpOptions::default()
                };
                exit_on_failures(dump_profile(&profile_dir, None, false, &options)?);
            } else {
                eprintln!("Usage: skypelog <profile_dir>");
                eprintln!("       skypelog dump <file>... [-f text|json] [--utc]");
                eprintln!("       skypelog profile <profile_dir> [-p pattern] [-r]");
                eprintln!("       skypelog list <profile_dir> [-p pattern] [-r]");
                eprintln!("       skypelog info <file>");
                eprintln!("       skypelog export <profile_dir> [-o output]");
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
