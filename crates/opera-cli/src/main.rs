//! OPERA - ESPaDOnS night dispatcher CLI
//!
//! The `opera` command resolves which instrument-mode/readout-speed
//! combinations are present in a night of raw exposures and runs one
//! reduction per eligible combination.
//!
//! With `-a` no reduction is run and the products of every known mode of the
//! night are removed instead.

use anyhow::{Context, Result};
use clap::Parser;
use opera_core::{
    init_tracing, render_mode, render_overall, verbosity, Inventory, ModeKey, ModeRecord,
    ProductKind, RunFlags, RunReporter, SharedResources,
};
use opera_pipeline::{write_summary_json, CommandExecutor, NightPipeline, NightSummary};
use std::path::{Path, PathBuf};
use tracing::{info, warn, Level};

#[derive(Parser, Debug)]
#[command(name = "opera")]
#[command(author = "OPERA Pipeline Developers")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Reduce an ESPaDOnS night mode by mode", long_about = None)]
struct Cli {
    /// Night directory name under the data root
    #[arg(short = 'N', long, env = "OPERA_NIGHT")]
    night: String,

    /// Data root directory
    #[arg(
        short = 'D',
        long,
        env = "OPERA_DATA_ROOT",
        default_value = "/data/espadons/"
    )]
    datarootdir: PathBuf,

    /// Pipeline home directory (holds config/)
    #[arg(short = 'O', long, env = "OPERA_PIPELINE_HOME")]
    pipelinehomedir: PathBuf,

    /// Data product root directory
    #[arg(short = 'P', long, env = "OPERA_PRODUCT_ROOT")]
    productrootdir: PathBuf,

    /// Target product: CALIBRATIONS, OBJECTS or LIBRE-ESPRIT
    #[arg(short = 'T', long, default_value = "OBJECTS")]
    product: ProductKind,

    /// Only clean all products of the night, no reduction
    #[arg(short = 'a')]
    cleanall: bool,

    /// Clean products before reducing
    #[arg(short = 'c')]
    clean: bool,

    /// Simulate: the reduction only reports what it would do
    #[arg(short = 's')]
    simulate: bool,

    /// Produce plots
    #[arg(short = 'p', long)]
    plot: bool,

    /// Verbose output
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Trace output
    #[arg(short = 't', long)]
    trace: bool,

    /// Group exposures by instrument mode only, merging readout speeds
    #[arg(long)]
    allow_any_readout: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,

    /// Write the night summary as JSON to this path
    #[arg(long)]
    summary_json: Option<PathBuf>,
}

impl Cli {
    fn flags(&self) -> RunFlags {
        RunFlags {
            clean: self.clean,
            clean_all: self.cleanall,
            simulate: self.simulate,
            plot: self.plot,
            verbose: self.verbose,
            trace: self.trace,
            allow_any_readout: self.allow_any_readout,
            force_calibration: self.product == ProductKind::Calibrations,
        }
    }

    fn log_level(&self) -> Level {
        verbosity(self.verbose, self.trace)
    }
}

/// Prints statistics to stdout.
struct ConsoleReporter;

impl RunReporter for ConsoleReporter {
    fn report_overall(&self, inventory: &Inventory) {
        println!("{}", render_overall(inventory));
    }

    fn report_mode(&self, key: &ModeKey, record: &ModeRecord) {
        println!("{}", render_mode(key, record));
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json, cli.log_level());

    if cli.verbose {
        println!("Pipeline home: {}", cli.pipelinehomedir.display());
        println!("Data root:     {}", cli.datarootdir.display());
        println!("Product root:  {}", cli.productrootdir.display());
        println!("Night:         {}", cli.night);
    }

    let summary = run(&cli).await?;
    println!("{}", summary.render_text());

    if let Some(path) = &cli.summary_json {
        write_summary_json(path, &summary)?;
        info!(path = %path.display(), "Wrote night summary");
    }

    finish(&summary)
}

async fn run(cli: &Cli) -> Result<NightSummary> {
    let resources = load_resources(
        &cli.pipelinehomedir,
        &cli.datarootdir,
        &cli.productrootdir,
        &cli.night,
    )?;
    let executor = CommandExecutor::from_settings(resources.settings());

    let summary = NightPipeline::run(
        &resources,
        &executor,
        &ConsoleReporter,
        cli.flags(),
        cli.product,
    )
    .await
    .context("Night could not be processed")?;
    Ok(summary)
}

fn load_resources(
    home: &Path,
    data: &Path,
    products: &Path,
    night: &str,
) -> Result<SharedResources> {
    SharedResources::load(home, data, products, night).context("Invalid pipeline configuration")
}

fn finish(summary: &NightSummary) -> Result<()> {
    if summary.mode_groups == 0 {
        warn!(night = %summary.night, "No exposures found for night");
    }

    let verdict = summary.verdict();
    if verdict.passed {
        println!("✓ {}", verdict.message);
        Ok(())
    } else {
        println!("✗ {}", verdict.message);
        for violation in &verdict.violations {
            println!("  - {}", violation);
        }
        anyhow::bail!("Night reduction failed")
    }
}
