use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::info;
use tbcodec::codec::DEFAULT_IDENTIFIER_COLUMNS;
use tbcodec::table::{self, Table};
use tbcodec::{evaluation, screen, BuiltinDeployment, DeploymentStore, DiabetesCoding, ModelDeployment};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    deployment: DeploymentArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct DeploymentArgs {
    /// Path to a deployment descriptor (JSON)
    #[arg(long, global = true, conflicts_with = "deployment")]
    descriptor: Option<PathBuf>,

    /// Name of a descriptor in the deployment store ($TBCODEC_HOME/deployments)
    #[arg(long, global = true)]
    deployment: Option<String>,

    /// DiabetesStatus coding of the builtin TB default model
    #[arg(long, global = true, value_enum, conflicts_with_all = ["descriptor", "deployment"])]
    diabetic_code: Option<DiabeticCode>,
}

#[derive(Clone, Copy, ValueEnum)]
enum DiabeticCode {
    /// "Diabetic" was coded 0
    Zero,
    /// "Diabetic" was coded 1
    One,
}

#[derive(Subcommand)]
enum Command {
    /// Print the codec configuration and fingerprint
    Info,
    /// Write the descriptor in use as JSON, with its fingerprint recorded
    Export {
        /// Output file, stdout if omitted
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// Also save it in the deployment store
        #[arg(long)]
        save: bool,
    },
    /// Write an empty input template (header row) or the accepted values per column
    Template {
        /// Identifier columns placed before the features
        #[arg(long, value_delimiter = ',', default_values_t = DEFAULT_IDENTIFIER_COLUMNS.map(String::from))]
        id_columns: Vec<String>,
        /// List the accepted values of every categorical column instead
        #[arg(long)]
        options: bool,
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Encode a CSV of records into the model input matrix
    Encode {
        input: PathBuf,
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// Write the original row index of every encoded row, for `decode --kept-rows`
        #[arg(long)]
        kept_rows: Option<PathBuf>,
    },
    /// Decode a CSV of raw model outputs (one row per record) into labels
    Decode {
        input: PathBuf,
        /// Original table to append a Prediction column to
        #[arg(long)]
        table: Option<PathBuf>,
        /// Row indices written by `encode --kept-rows`; dropped rows get no prediction
        #[arg(long, requires = "table")]
        kept_rows: Option<PathBuf>,
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Score a table with actual and predicted labels
    Evaluate {
        input: PathBuf,
        #[arg(long, default_value = "Actual")]
        actual_col: String,
        #[arg(long, default_value = "Prediction")]
        pred_col: String,
        /// Print the result as JSON instead of a report
        #[arg(long)]
        json: bool,
    },
}

impl DeploymentArgs {
    fn resolve(&self) -> Result<ModelDeployment> {
        if let Some(path) = &self.descriptor {
            return ModelDeployment::load(path).with_context(|| format!("loading descriptor {:?}", path));
        }
        if let Some(name) = &self.deployment {
            let store = DeploymentStore::new_default().context("opening deployment store")?;
            return store
                .load(name)
                .with_context(|| format!("loading deployment '{}' from {:?}", name, store.dir()));
        }
        match self.diabetic_code {
            Some(code) => Ok(BuiltinDeployment::TbDefault.descriptor(code.into())),
            None => bail!(
                "no deployment selected: pass --descriptor, --deployment, or --diabetic-code for the builtin model"
            ),
        }
    }
}

impl From<DiabeticCode> for DiabetesCoding {
    fn from(code: DiabeticCode) -> Self {
        match code {
            DiabeticCode::Zero => DiabetesCoding::DiabeticIsZero,
            DiabeticCode::One => DiabetesCoding::DiabeticIsOne,
        }
    }
}

fn output(path: Option<&Path>) -> Result<Box<dyn Write>> {
    Ok(match path {
        Some(path) => Box::new(File::create(path).with_context(|| format!("creating {:?}", path))?),
        None => Box::new(io::stdout().lock()),
    })
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let start_time = Instant::now();

    let deployment = cli.deployment.resolve()?;
    let codec = deployment.codec().context("building codec")?;
    info!("Using deployment '{}' {}", deployment.name, deployment.version);

    match cli.command {
        Command::Info => {
            println!("{}", serde_json::to_string_pretty(&codec.info())?);
        }
        Command::Export { out, save } => {
            let sealed = deployment.sealed()?;
            if save {
                let path = DeploymentStore::new_default()?.save(&sealed)?;
                eprintln!("Saved to {:?}", path);
            }
            writeln!(output(out.as_deref())?, "{}", sealed.to_json()?)?;
        }
        Command::Template { id_columns, options, out } => {
            let writer = output(out.as_deref())?;
            if options {
                table::write_template_options(codec.schema(), writer)?;
            } else {
                table::write_template(codec.schema(), &id_columns, writer)?;
            }
        }
        Command::Encode { input, out, kept_rows } => {
            let uploaded = Table::from_path(&input).with_context(|| format!("reading {:?}", input))?;
            let screened = screen(&codec, uploaded.to_records(None), deployment.missing_values)?;
            for dropped in &screened.dropped {
                eprintln!("Dropped row {}: missing {}", dropped.row + 1, dropped.fields.join(", "));
            }
            let matrix = codec.encode(&screened.kept)?;
            table::write_matrix(&codec.output_columns(), &matrix, output(out.as_deref())?)?;
            match kept_rows {
                Some(path) => {
                    let file = File::create(&path).with_context(|| format!("creating {:?}", path))?;
                    table::write_row_indices(&screened.kept_rows, file)?;
                }
                None if !screened.dropped.is_empty() => {
                    eprintln!("Rows were dropped; pass --kept-rows to align predictions with {:?}", input);
                }
                None => {}
            }
            info!("Encoded {} rows in {:.2?}", matrix.nrows(), start_time.elapsed());
        }
        Command::Decode { input, table: original, kept_rows, out } => {
            let raw = Table::from_path(&input).with_context(|| format!("reading {:?}", input))?;
            let labels: Vec<String> = raw.raw_outputs().iter().map(|r| codec.decode(r)).collect();
            match original {
                Some(path) => {
                    let mut original = Table::from_path(&path).with_context(|| format!("reading {:?}", path))?;
                    let kept = match &kept_rows {
                        Some(rows) => {
                            let file = File::open(rows).with_context(|| format!("reading {:?}", rows))?;
                            Some(table::read_row_indices(file)?)
                        }
                        None => None,
                    };
                    original
                        .push_predictions(labels, kept.as_deref())
                        .with_context(|| format!("aligning outputs in {:?} with {:?}", input, path))?;
                    original.write_csv(output(out.as_deref())?)?;
                }
                None => {
                    let mut writer = output(out.as_deref())?;
                    writeln!(writer, "Prediction")?;
                    for label in labels {
                        writeln!(writer, "{}", label)?;
                    }
                }
            }
        }
        Command::Evaluate { input, actual_col, pred_col, json } => {
            let scored = Table::from_path(&input).with_context(|| format!("reading {:?}", input))?;
            let result = evaluation::evaluate_table(
                &scored.headers,
                &scored.rows,
                &actual_col,
                &pred_col,
                deployment.label_coding.as_ref(),
            )?;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print!("{}", result);
            }
        }
    }

    Ok(())
}
