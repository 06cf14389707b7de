use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use toll_etl::constants::*;
use toll_etl::pipeline::{PipelineOrchestrator, StepStatus, TracingNotifier};
use toll_etl::stages::{self, MergePolicy};
use toll_etl::{logging, PipelineConfig};
use tracing::error;

#[derive(Parser)]
#[command(name = "toll_etl")]
#[command(about = "Toll plaza traffic ETL: expand, extract, consolidate, transform")]
#[command(version = "0.1.0")]
struct Cli {
    /// Config file (defaults to $TOLL_ETL_CONFIG, then ./toll_etl.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory for the rotated JSON log
    #[arg(long, global = true, default_value = "logs")]
    log_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every stage in dependency order with retries and alerting
    Run {
        /// Override the archive path from config
        #[arg(long)]
        archive: Option<PathBuf>,
        /// Override the staging directory from config
        #[arg(long)]
        staging_dir: Option<PathBuf>,
        /// Write the run summary as JSON to this path
        #[arg(long)]
        summary: Option<PathBuf>,
    },
    /// Print the step graph as execution layers
    Plan,
    /// Expand the archive into a directory
    Expand {
        #[arg(long)]
        archive: PathBuf,
        #[arg(long)]
        dest: PathBuf,
    },
    /// Extract fields from the comma-delimited vehicle data
    ExtractCsv {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
    },
    /// Extract fields from the tab-delimited toll plaza data
    ExtractTsv {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
    },
    /// Extract fields from the fixed-width payment data
    ExtractFixedWidth {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
    },
    /// Merge the three extracts column-wise by row position
    Consolidate {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long)]
        tsv: PathBuf,
        #[arg(long)]
        fixed_width: PathBuf,
        #[arg(long)]
        output: PathBuf,
        /// Fail instead of truncating when row counts differ
        #[arg(long)]
        strict: bool,
    },
    /// Uppercase the required field of the consolidated record set
    Transform {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
        #[arg(long, default_value = DEFAULT_TRANSFORM_FIELD)]
        field: String,
    },
}

/// Print the outcome of a single stage and map it to an exit code.
fn report<T>(stage: &str, result: toll_etl::Result<T>, describe: impl FnOnce(&T) -> String) -> ExitCode {
    match result {
        Ok(value) => {
            println!("✅ {}: {}", stage, describe(&value));
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{} failed: {}", stage, e);
            println!("❌ {} failed ({:?}): {}", stage, e.kind(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run_pipeline(
    mut config: PipelineConfig,
    archive: Option<PathBuf>,
    staging_dir: Option<PathBuf>,
    summary: Option<&Path>,
) -> anyhow::Result<ExitCode> {
    if let Some(archive) = archive {
        config.paths.archive = archive;
    }
    if let Some(staging_dir) = staging_dir {
        config.paths.staging_dir = staging_dir;
    }

    let orchestrator = PipelineOrchestrator::new(&config, Arc::new(TracingNotifier))?;
    let result = orchestrator.run_pipeline().await?;

    println!("\n📊 Pipeline '{}' (run {}):", result.pipeline_name, result.run_id);
    for layer in orchestrator.dag().layers()? {
        for kind in layer {
            if let Some(outcome) = result.outcome(kind) {
                let icon = match outcome.status {
                    StepStatus::Succeeded => "✅",
                    StepStatus::Failed => "❌",
                    StepStatus::Skipped => "⏭️",
                };
                println!("   {} {} ({} attempt(s)): {}", icon, kind, outcome.attempts, outcome.message);
            }
        }
    }

    if let Some(path) = summary {
        let json = serde_json::to_string_pretty(&result)?;
        std::fs::write(path, json).with_context(|| format!("writing run summary to {}", path.display()))?;
        println!("   Summary written to {}", path.display());
    }

    if result.success {
        println!("🎉 Final output: {}", orchestrator.layout().transformed.display());
        Ok(ExitCode::SUCCESS)
    } else {
        println!("💥 Pipeline failed; no final output was produced");
        Ok(ExitCode::FAILURE)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    let _log_guard = logging::init_logging(&cli.log_dir)?;

    let code = match cli.command {
        Commands::Run {
            archive,
            staging_dir,
            summary,
        } => {
            let config = PipelineConfig::load(cli.config.as_deref())?;
            run_pipeline(config, archive, staging_dir, summary.as_deref()).await?
        }
        Commands::Plan => {
            let config = PipelineConfig::load(cli.config.as_deref())?;
            let orchestrator = PipelineOrchestrator::new(&config, Arc::new(TracingNotifier))?;
            println!("📋 Pipeline '{}' ({}):", config.run.name, config.run.schedule);
            for (i, layer) in orchestrator.dag().layers()?.iter().enumerate() {
                let names: Vec<&str> = layer.iter().map(|k| k.step_name()).collect();
                println!("   {}. {}", i + 1, names.join(" | "));
            }
            ExitCode::SUCCESS
        }
        Commands::Expand { archive, dest } => report(STAGE_EXPAND, stages::expand_archive(&archive, &dest), |r| {
            format!("expanded {} files into {}", r.members.len(), r.destination.display())
        }),
        Commands::ExtractCsv { input, output } => {
            report(STAGE_EXTRACT_CSV, stages::extract_csv(&input, &output), |r| {
                format!("wrote {} rows to {}", r.artifact.rows, r.artifact.path.display())
            })
        }
        Commands::ExtractTsv { input, output } => {
            report(STAGE_EXTRACT_TSV, stages::extract_tsv(&input, &output), |r| {
                format!("wrote {} rows to {}", r.artifact.rows, r.artifact.path.display())
            })
        }
        Commands::ExtractFixedWidth { input, output } => report(
            STAGE_EXTRACT_FIXED_WIDTH,
            stages::extract_fixed_width(&input, &output),
            |r| format!("wrote {} rows to {}", r.artifact.rows, r.artifact.path.display()),
        ),
        Commands::Consolidate {
            csv,
            tsv,
            fixed_width,
            output,
            strict,
        } => {
            let policy = if strict { MergePolicy::Strict } else { MergePolicy::Truncate };
            let inputs = [csv.as_path(), tsv.as_path(), fixed_width.as_path()];
            report(STAGE_CONSOLIDATE, stages::consolidate(&inputs, &output, policy), |r| {
                format!("wrote {} rows to {}", r.artifact.rows, r.artifact.path.display())
            })
        }
        Commands::Transform { input, output, field } => {
            report(STAGE_TRANSFORM, stages::transform(&input, &output, &field), |r| {
                format!(
                    "uppercased '{}' in {} rows, wrote {}",
                    r.field,
                    r.artifact.rows,
                    r.artifact.path.display()
                )
            })
        }
    };

    Ok(code)
}
