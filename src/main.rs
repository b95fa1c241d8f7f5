use std::fs::File;
use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand, ValueEnum};

use biotag::{
    read_piped, Alphabet, Evaluation, FeatureConfig, ModelKind, Sentence, Stopping, Tagger,
    TrainOpts,
};

#[derive(Debug, Parser)]
#[command(version, about = "Trainable linear-chain sequence tagger")]
#[command(propagate_version = true)]
struct Argv {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    Crf,
    Maxent,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Crf => write!(f, "crf"),
            Mode::Maxent => write!(f, "maxent"),
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Train a model from piped-format data (token|meta…|label).
    Train {
        /// Training data in piped format.
        data: PathBuf,
        /// Feature configuration file (key = value lines).
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Where to write the trained model.
        #[arg(short, long)]
        model: PathBuf,
        #[arg(long, value_enum, default_value_t = Mode::Crf)]
        mode: Mode,
        /// Fixed number of training passes; default is to run to convergence.
        #[arg(short, long)]
        iterations: Option<usize>,
        /// L2 regularization strength.
        #[arg(long, default_value_t = 0.1)]
        c2: f64,
    },
    /// Tag sentences (one per line, whitespace-tokenized) with a model.
    Tag {
        input: PathBuf,
        #[arg(short, long)]
        model: PathBuf,
        /// Input is in piped format rather than plain tokens.
        #[arg(long)]
        ppd: bool,
        /// Report a confidence value per predicted segment.
        #[arg(long)]
        confidence: bool,
    },
    /// Tag a labeled piped-format file and report accuracy and per-label
    /// precision/recall/F1.
    Eval {
        gold: PathBuf,
        #[arg(short, long)]
        model: PathBuf,
    },
    /// Print a JSON summary of a stored model.
    Dump {
        #[arg(short, long)]
        model: PathBuf,
    },
}

fn load_config(path: &Option<PathBuf>) -> FeatureConfig {
    match path {
        Some(p) => {
            let file = File::open(p).expect("failed to open configuration file");
            FeatureConfig::from_reader(file).expect("failed to parse configuration file")
        }
        None => FeatureConfig::new(),
    }
}

fn plain_sentences(path: &PathBuf) -> Vec<Sentence> {
    let text = std::fs::read_to_string(path).expect("failed to read input file");
    text.lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| Sentence::from_tokens(&l.split_whitespace().collect::<Vec<_>>()))
        .collect()
}

fn main() {
    env_logger::init();
    let argv = Argv::parse();

    match argv.command {
        Command::Train {
            data,
            config,
            model,
            mode,
            iterations,
            c2,
        } => {
            let config = load_config(&config);
            let file = File::open(&data).expect("failed to open training file");
            let sentences = read_piped(file, &config).expect("failed to read training data");
            let opts = TrainOpts {
                mode: match mode {
                    Mode::Crf => ModelKind::Chain,
                    Mode::Maxent => ModelKind::PerUnit,
                },
                stopping: match iterations {
                    Some(n) => Stopping::Iterations(n),
                    None => Stopping::Converge,
                },
                c2,
            };
            let begin = Instant::now();
            let tagger =
                Tagger::train(&sentences, Alphabet::new(), config, &opts).expect("training failed");
            log::info!("learning took {:?}", begin.elapsed());
            tagger.save_to_path(&model).expect("failed to write model");
        }
        Command::Tag {
            input,
            model,
            ppd,
            confidence,
        } => {
            let tagger = Tagger::load_from_path(&model).expect("failed to load model");
            let sentences = if ppd {
                let file = File::open(&input).expect("failed to open input file");
                read_piped(file, tagger.config()).expect("failed to read input")
            } else {
                plain_sentences(&input)
            };
            let lines = tagger
                .predict_iob(sentences, confidence)
                .expect("prediction failed");
            for line in lines {
                println!("{line}");
            }
        }
        Command::Eval { gold, model } => {
            let tagger = Tagger::load_from_path(&model).expect("failed to load model");
            let file = File::open(&gold).expect("failed to open gold file");
            let sentences = read_piped(file, tagger.config()).expect("failed to read gold data");
            let mut evaluation = Evaluation::default();
            for sentence in sentences {
                let reference: Vec<String> = sentence
                    .units()
                    .iter()
                    .map(|u| u.label().unwrap_or(biotag::OUTSIDE).to_string())
                    .collect();
                let tagged = tagger.predict(sentence, false).expect("prediction failed");
                let prediction: Vec<&str> = tagged
                    .units()
                    .iter()
                    .map(|u| u.label().unwrap_or(biotag::OUTSIDE))
                    .collect();
                let reference: Vec<&str> = reference.iter().map(|s| s.as_str()).collect();
                evaluation.accumulate(&reference, &prediction);
            }
            evaluation.evaluate();
            println!("{evaluation}");
        }
        Command::Dump { model } => {
            let tagger = Tagger::load_from_path(&model).expect("failed to load model");
            let labels: Vec<&str> = tagger.labels().iter().collect();
            let summary = serde_json::json!({
                "kind": format!("{:?}", tagger.kind()),
                "labels": labels,
                "num_attributes": tagger.num_attrs(),
                "config": tagger.config(),
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&summary).expect("failed to render summary")
            );
        }
    }
}
