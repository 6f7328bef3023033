use std::{fs, path::PathBuf, process::ExitCode};

use anyhow::Context as _;
use clap::Parser;
use log::error;
use visual_diff::{CompareConfig, VisualComparator};

/// Compare a design reference with an implementation screenshot.
#[derive(Parser, Debug)]
#[command(name = "visual-diff", version)]
struct Cli {
    /// Design reference image.
    design: PathBuf,

    /// Implementation screenshot.
    #[arg(value_name = "IMPL")]
    implementation: PathBuf,

    /// Output directory, created if absent.
    #[arg(short, long, default_value = "./diff-output")]
    output: PathBuf,

    /// Per-pixel difference threshold (0-255).
    #[arg(short, long)]
    threshold: Option<u32>,

    /// Opacity of the implementation layer in the overlay, in (0, 1].
    #[arg(long)]
    opacity: Option<f32>,

    /// JSON file with comparison settings; flags take precedence.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the JSON report instead of the summary.
    #[arg(long)]
    json: bool,
}

fn load_config(cli: &Cli) -> anyhow::Result<CompareConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => CompareConfig::default(),
    };

    if let Some(threshold) = cli.threshold {
        config.threshold = threshold;
    }
    if let Some(opacity) = cli.opacity {
        config.opacity = opacity;
    }

    config.validate()?;
    Ok(config)
}

fn run(cli: &Cli) -> anyhow::Result<bool> {
    let config = load_config(cli)?;

    let report = VisualComparator::new(&cli.design, &cli.implementation)?
        .with_config(config)
        .compare_to_dir(&cli.output)
        .with_context(|| format!("comparing into {}", cli.output.display()))?;

    if cli.json {
        println!("{}", report.to_json()?);
    } else {
        print!("{}", report.summary());
    }

    Ok(report.verdict().is_pass())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(err) => {
            error!("{err:#}");
            ExitCode::from(2)
        }
    }
}
