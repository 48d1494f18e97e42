//! Command-line front end: list the model catalog, print a model's
//! required probe panel, or evaluate a model against a methylation
//! matrix CSV. All heavy lifting lives in the library; this file is
//! argument parsing, wiring, and output.

use clap::{Parser, Subcommand, ValueEnum};
use itertools::Itertools;
use std::error::Error;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::process;
use std::time::Instant;

use clepsydra::data::load_methylation_matrix;
use clepsydra::impute::{ImputeFn, ImputingModel, constant_fill, sample_mean_fill};
use clepsydra::registry::{EvaluatorKind, ModelRegistry};
use clepsydra::types::MethylationModel;

#[derive(Parser, Debug)]
#[command(
    name = "clepsydra",
    version,
    about = "Evaluates published DNA methylation clocks against a beta-value matrix."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the models in the catalog.
    List {
        /// TOML catalog to use instead of the bundled one.
        #[arg(long)]
        registry: Option<PathBuf>,
    },
    /// Print the probe panel a model requires, one identifier per line.
    Sites {
        /// Model name, as listed by `list`.
        model: String,
        /// Directory holding the coefficient CSV files.
        #[arg(long)]
        data_dir: PathBuf,
        #[arg(long)]
        registry: Option<PathBuf>,
    },
    /// Evaluate a model against a methylation matrix CSV
    /// (probes as rows, samples as columns).
    Predict {
        /// Model name, as listed by `list`.
        model: String,
        /// Methylation matrix CSV.
        #[arg(long)]
        data: PathBuf,
        /// Directory holding the coefficient CSV files.
        #[arg(long)]
        data_dir: PathBuf,
        /// Write the prediction TSV here instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
        /// Fill strategy for probes the model requires but the matrix
        /// lacks.
        #[arg(long, value_enum, default_value = "none")]
        impute: ImputeStrategy,
        /// Fill value for `--impute constant`.
        #[arg(long, default_value_t = 0.5)]
        fill_value: f64,
        #[arg(long)]
        registry: Option<PathBuf>,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum ImputeStrategy {
    /// No imputation; missing probes degrade the score silently.
    None,
    /// Fill with each sample's mean over its observed values.
    Mean,
    /// Fill with a fixed constant (see --fill-value).
    Constant,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::List { registry } => run_list(registry),
        Commands::Sites {
            model,
            data_dir,
            registry,
        } => run_sites(&model, &data_dir, registry),
        Commands::Predict {
            model,
            data,
            data_dir,
            output,
            impute,
            fill_value,
            registry,
        } => run_predict(&model, &data, &data_dir, output, impute, fill_value, registry),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn load_registry(path: Option<PathBuf>) -> Result<ModelRegistry, Box<dyn Error>> {
    match path {
        Some(path) => Ok(ModelRegistry::from_toml_file(&path)?),
        None => Ok(ModelRegistry::bundled()),
    }
}

fn kind_label(kind: EvaluatorKind) -> &'static str {
    match kind {
        EvaluatorKind::Linear => "linear",
        EvaluatorKind::SexEstimation => "sex-estimation",
        EvaluatorKind::NotImplemented => "not-implemented",
    }
}

fn run_list(registry: Option<PathBuf>) -> Result<(), Box<dyn Error>> {
    let registry = load_registry(registry)?;

    println!(
        "{:<18} {:<16} {:>5}  {:<16} {}",
        "NAME", "KIND", "YEAR", "TISSUE", "OUTPUT"
    );
    for (name, definition) in registry.iter() {
        let year = definition
            .metadata
            .year
            .map_or_else(|| "-".to_string(), |y| y.to_string());
        println!(
            "{:<18} {:<16} {:>5}  {:<16} {}",
            name,
            kind_label(definition.model.kind),
            year,
            definition.metadata.tissue.as_deref().unwrap_or("-"),
            definition.metadata.output.as_deref().unwrap_or("-"),
        );
    }
    Ok(())
}

fn run_sites(
    model: &str,
    data_dir: &PathBuf,
    registry: Option<PathBuf>,
) -> Result<(), Box<dyn Error>> {
    let registry = load_registry(registry)?;
    let evaluator = registry.build(model, data_dir)?;
    println!("{}", evaluator.methylation_sites().iter().join("\n"));
    Ok(())
}

fn run_predict(
    model: &str,
    data: &PathBuf,
    data_dir: &PathBuf,
    output: Option<PathBuf>,
    impute: ImputeStrategy,
    fill_value: f64,
    registry: Option<PathBuf>,
) -> Result<(), Box<dyn Error>> {
    let start = Instant::now();

    let registry = load_registry(registry)?;
    let evaluator = registry.build(model, data_dir)?;
    let evaluator: Box<dyn MethylationModel> = match impute {
        ImputeStrategy::None => evaluator,
        ImputeStrategy::Mean => Box::new(ImputingModel::new(evaluator, sample_mean_fill())),
        ImputeStrategy::Constant => {
            let fill: ImputeFn = constant_fill(fill_value);
            Box::new(ImputingModel::new(evaluator, fill))
        }
    };

    let matrix = load_methylation_matrix(data)?;
    log::info!(
        "evaluating '{model}' on {} samples x {} probes",
        matrix.n_samples(),
        matrix.n_probes()
    );

    let predictions = evaluator.predict(&matrix);

    match output {
        Some(path) => {
            let mut writer = BufWriter::new(File::create(&path)?);
            predictions.write_tsv(&mut writer)?;
            writer.flush()?;
            log::info!("wrote predictions to '{}'", path.display());
        }
        None => {
            let stdout = io::stdout();
            let mut writer = BufWriter::new(stdout.lock());
            predictions.write_tsv(&mut writer)?;
            writer.flush()?;
        }
    }

    log::info!("prediction complete in {:.2?}", start.elapsed());
    Ok(())
}
