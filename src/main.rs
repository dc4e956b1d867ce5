mod clock;
mod config;
mod error;
mod geo;
mod metadata;
mod processor;
mod sheet;
mod table;
mod walker;
mod watermark;

use crate::config::AppConfig;
use crate::processor::RowOutcome;
use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use log::{error, info, warn};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(version, about = "Watermark and geotag photos from a tracking table")]
struct Cli {
    /// Configuration file used instead of config/default
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Watermark, geotag and fan out every paired image
    Run {
        #[arg(long)]
        table: Option<PathBuf>,
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Extract one sheet of a workbook into a CSV table
    ConvertSheet {
        #[arg(long)]
        workbook: Option<PathBuf>,
        #[arg(long)]
        sheet: Option<String>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = AppConfig::new(cli.config.as_deref())?;

    env_logger::Builder::new()
        .filter_level(config.log_level.parse().unwrap_or(log::LevelFilter::Info))
        .init();

    match cli.command {
        Command::Run {
            table,
            input,
            output,
        } => {
            if let Some(table) = table {
                config.table_file = table;
            }
            if let Some(input) = input {
                config.input_dir = input;
            }
            if let Some(output) = output {
                config.output_dir = output;
            }

            info!("Starting geostamp run");
            let report = processor::run(&config)?;
            for row in &report.rows {
                match &row.outcome {
                    RowOutcome::Written { .. } => {}
                    RowOutcome::Skipped { reason } => {
                        warn!("Skipped line {} ({}): {}", row.line, row.file_name, reason)
                    }
                    RowOutcome::Failed { source, error, .. } => error!(
                        "Failed line {} ({}) from {:?}: {}",
                        row.line, row.file_name, source, error
                    ),
                }
            }
            info!(
                "Finished: {} files written, {} rows skipped, {} rows failed",
                report.files_written(),
                report.skipped(),
                report.failed()
            );
        }
        Command::ConvertSheet {
            workbook,
            sheet,
            output,
        } => {
            let defaults = config.sheet.clone();
            let workbook = workbook
                .or_else(|| defaults.as_ref().map(|s| s.workbook.clone()))
                .ok_or_else(|| anyhow!("no workbook given"))?;
            let sheet = sheet
                .or_else(|| defaults.as_ref().map(|s| s.name.clone()))
                .ok_or_else(|| anyhow!("no sheet name given"))?;
            let output = output
                .or_else(|| defaults.as_ref().map(|s| s.output.clone()))
                .ok_or_else(|| anyhow!("no output path given"))?;

            sheet::convert_sheet(&workbook, &sheet, &output)?;
        }
    }

    Ok(())
}
