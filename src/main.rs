use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use overhead_oracle::calibration::TargetId;
use overhead_oracle::output::{csv, format_report, to_json_pretty, write_json};
use overhead_oracle::{logging, Config, OverheadOracle, WaitSite};

#[derive(Parser, Debug)]
#[command(name = "overhead-oracle", version)]
#[command(about = "Quantify wait-site instrumentation overhead from device profiler logs", long_about = None)]
struct Cli {
    /// JSON configuration file; OVERHEAD_* environment variables override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compare profiler and counter variants against baseline
    Analyze {
        /// Root holding <variant>/<run>/... device logs
        root: PathBuf,
        /// Output format on stdout
        #[arg(long, value_enum, default_value_t = Format::Terminal)]
        format: Format,
        /// Also write the JSON report to this file
        #[arg(long)]
        json_out: Option<PathBuf>,
        /// Write statistics, comparison and summary CSV tables into this directory
        #[arg(long)]
        csv_dir: Option<PathBuf>,
        /// Wait site used for blocked-time estimates (front or back)
        #[arg(long)]
        blocked_site: Option<WaitSite>,
        /// Flag test cases whose slowdown exceeds this multiple of the median
        #[arg(long)]
        outlier_multiple: Option<f64>,
    },
    /// Fit cycles-per-iteration from matched profiler and counter runs
    Calibrate {
        /// Root holding <variant>/<run>/... device logs
        root: PathBuf,
        /// Wait site whose zone and counter are paired (front or back)
        #[arg(long)]
        site: Option<WaitSite>,
        /// Only report this architecture
        #[arg(long)]
        target: Option<String>,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Format {
    Terminal,
    Json,
}

fn load_config(path: Option<&PathBuf>) -> overhead_oracle::Result<Config> {
    let base = match path {
        Some(path) => Config::from_json_file(path)?,
        None => Config::default(),
    };
    base.from_env()
}

fn run(cli: Cli) -> overhead_oracle::Result<()> {
    let mut config = load_config(cli.config.as_ref())?;
    match cli.command {
        Commands::Analyze {
            root,
            format,
            json_out,
            csv_dir,
            blocked_site,
            outlier_multiple,
        } => {
            if let Some(site) = blocked_site {
                config.blocked_site = site;
            }
            if let Some(k) = outlier_multiple {
                config.outlier_multiple = k;
            }
            let report = OverheadOracle::with_config(config).analyze(&root)?;
            match format {
                Format::Terminal => print!("{}", format_report(&report)),
                Format::Json => println!("{}", to_json_pretty(&report)?),
            }
            if let Some(path) = json_out {
                write_json(&report, &path)?;
            }
            if let Some(dir) = csv_dir {
                csv::write_tables(&report, &dir)?;
            }
        }
        Commands::Calibrate { root, site, target } => {
            if let Some(site) = site {
                config.blocked_site = site;
            }
            let wanted = target.map(TargetId::new);
            let site = config.blocked_site;
            let calibrations = OverheadOracle::with_config(config).calibrate(&root)?;
            for c in calibrations.iter().filter(|c| wanted.as_ref().map_or(true, |w| *w == c.target)) {
                match &c.calibration {
                    Some(cal) => println!("{} {}: {:.4} cycles/iteration", c.target, site, cal.cycles_per_iteration),
                    None => println!(
                        "{} {}: uncalibrated ({})",
                        c.target,
                        site,
                        c.error.as_deref().unwrap_or("unknown")
                    ),
                }
            }
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    if let Err(e) = logging::init_logging() {
        eprintln!("warning: {e}");
    }
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "overhead-oracle failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
