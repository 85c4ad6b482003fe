use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{WrapErr, eyre};
use uqcase::commands::{self, AggregateRequest};
use uqcase::util::atomic_write;
use uqcase::{SamplingOverrides, StudyFile, init_logging};
use uqcase_core::SamplingMethod;

#[derive(Parser, Debug)]
#[command(name = "uqcase")]
#[command(about = "Uncertainty-quantification studies over parametric simulation cases")]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Directory for uqcase.log (default: the study's output root for `run`,
    /// otherwise the current directory)
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the design matrix as CSV
    Sample(StudyArgs),
    /// Materialize and run every sample of a study
    Run(StudyArgs),
    /// Stack sample outputs into one labelled dataset (JSON)
    Aggregate(AggregateArgs),
    /// Create or check case file templates
    Template {
        #[command(subcommand)]
        action: TemplateCommand,
    },
}

#[derive(Subcommand, Debug)]
enum TemplateCommand {
    /// Turn literal values of a case file into `{{ name }}` placeholders
    Create {
        /// Existing case file
        #[arg(short, long)]
        input: PathBuf,

        /// Template file to write
        #[arg(short, long)]
        output: PathBuf,

        /// VALUE=NAME pairs, e.g. `--replace 1e-05=nu`
        #[arg(short, long = "replace", value_parser = commands::parse_replacement, required = true)]
        replacements: Vec<(String, String)>,
    },
    /// Check templates for required placeholders without rendering
    Check {
        /// Check every template a study file refers to
        #[arg(short, long, conflicts_with_all = ["template", "require"])]
        config: Option<PathBuf>,

        /// Check a single template file
        #[arg(short, long)]
        template: Option<PathBuf>,

        /// Placeholders the template must contain
        #[arg(long, num_args = 1.., requires = "template")]
        require: Vec<String>,
    },
}

#[derive(clap::Args, Debug)]
struct StudyArgs {
    /// Study configuration file (YAML)
    #[arg(short, long)]
    config: PathBuf,

    /// Number of samples (overrides `sampling.n_samples`)
    #[arg(short = 'n', long)]
    samples: Option<usize>,

    /// lhs, random, grid, plackett_burman, box_behnken, central_composite
    #[arg(short, long)]
    method: Option<SamplingMethod>,

    /// Seed for stochastic methods
    #[arg(long)]
    seed: Option<u64>,
}

impl StudyArgs {
    fn overrides(&self) -> SamplingOverrides {
        SamplingOverrides {
            method: self.method,
            n_samples: self.samples,
            seed: self.seed,
        }
    }
}

#[derive(clap::Args, Debug)]
struct AggregateArgs {
    /// Study directory holding sample_000, sample_001, ...
    #[arg(long)]
    study_dir: PathBuf,

    /// Field names to read from each time directory
    #[arg(long, num_args = 1.., required = true)]
    variables: Vec<String>,

    /// Read samples 0..N (default: the successful samples in study_report.yaml)
    #[arg(short = 'n', long)]
    samples: Option<usize>,

    /// Time directories to read (default: all numeric directories)
    #[arg(long, num_args = 1..)]
    times: Vec<String>,

    /// Reader threads
    #[arg(long, default_value_t = 4)]
    threads: usize,

    /// Attach cell centre coordinates from 0/C
    #[arg(long)]
    mesh: bool,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let args = Args::parse();
    let cwd = PathBuf::from(".");

    match args.command {
        Command::Sample(study_args) => {
            let study = StudyFile::load(&study_args.config)?;
            init_logging(&args.log_dir.unwrap_or(cwd), &args.log_level)?;

            print!("{}", commands::sample(&study, &study_args.overrides())?);
        }
        Command::Run(study_args) => {
            let study = StudyFile::load(&study_args.config)?;
            let log_dir = args
                .log_dir
                .unwrap_or_else(|| study.experiment.output_root.clone());
            init_logging(&log_dir, &args.log_level)?;

            let report = commands::run(&study, &study_args.overrides())?;
            print!("{}", commands::summary(&report));
        }
        Command::Aggregate(aggregate_args) => {
            init_logging(&args.log_dir.unwrap_or(cwd), &args.log_level)?;

            let request = AggregateRequest {
                study_dir: aggregate_args.study_dir,
                variables: aggregate_args.variables,
                samples: aggregate_args.samples,
                times: aggregate_args.times,
                threads: aggregate_args.threads,
                mesh: aggregate_args.mesh,
            };
            let dataset = commands::aggregate(&request)?;
            let json = commands::dataset_json(&dataset)?;
            match aggregate_args.output {
                Some(path) => {
                    atomic_write(&path, &json)
                        .wrap_err_with(|| format!("Failed to write {}", path.display()))?;
                    tracing::info!(output = %path.display(), "dataset written");
                }
                None => println!("{json}"),
            }
        }
        Command::Template { action } => {
            init_logging(&args.log_dir.unwrap_or(cwd), &args.log_level)?;

            match action {
                TemplateCommand::Create {
                    input,
                    output,
                    replacements,
                } => {
                    let template = commands::create_template(&input, &output, &replacements)?;
                    println!(
                        "{}: {} placeholder(s)",
                        output.display(),
                        template.placeholders().len()
                    );
                }
                TemplateCommand::Check {
                    config: Some(config),
                    ..
                } => {
                    let study = StudyFile::load(&config)?;
                    let checked = commands::check_study_templates(&study)?;
                    println!("{checked} template(s) ok");
                }
                TemplateCommand::Check {
                    template: Some(template),
                    require,
                    ..
                } => {
                    commands::check_template_file(&template, &require)?;
                    println!("{} ok", template.display());
                }
                TemplateCommand::Check { .. } => {
                    return Err(eyre!("template check needs --config or --template"));
                }
            }
        }
    }

    tracing::info!("uqcase finished");
    Ok(())
}
