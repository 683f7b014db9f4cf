use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use rs_signlang_pipeline::modules::sign_classifier::save_bundle;
use rs_signlang_pipeline::svm::trainer::{
    accuracy, confusion_matrix, load_training_data, predict_labels, render_confusion_matrix,
    train_test_split, SvmTrainer,
};

const USAGE: &str = "\
Train a sign classifier from per-class .npy landmark captures.

Usage: train [options]
  --data <dir>         directory of .npy class files (default: data)
  --dir <dir>          where to write the model artifact (default: models)
  --model-name <name>  artifact file stem (default: model)
  --hard               skip probability calibration
  -h, --help           show this help
";

const TEST_RATIO: f32 = 0.2;

struct TrainArgs {
    data_dir: PathBuf,
    out_dir: PathBuf,
    model_name: String,
    hard: bool,
}

fn parse_args() -> Result<TrainArgs> {
    let mut parsed = TrainArgs {
        data_dir: PathBuf::from("data"),
        out_dir: PathBuf::from("models"),
        model_name: "model".to_string(),
        hard: false,
    };
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--data" => parsed.data_dir = next_value(&mut args, "--data")?.into(),
            "--dir" => parsed.out_dir = next_value(&mut args, "--dir")?.into(),
            "--model-name" => parsed.model_name = next_value(&mut args, "--model-name")?,
            "--hard" => parsed.hard = true,
            "-h" | "--help" => {
                print!("{USAGE}");
                std::process::exit(0);
            }
            other => bail!("unknown argument '{other}'\n{USAGE}"),
        }
    }
    Ok(parsed)
}

fn next_value(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<String> {
    args.next()
        .with_context(|| format!("train - {flag} expects a value"))
}

fn main() -> Result<()> {
    let args = parse_args()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let started = Instant::now();

    let (samples, labels, mapping) = load_training_data(&args.data_dir)?;
    let class_names: Vec<&str> = mapping.values().map(String::as_str).collect();
    info!(
        samples = samples.nrows(),
        features = samples.ncols(),
        classes = ?class_names,
        "training data loaded"
    );

    let trainer = SvmTrainer {
        probability: !args.hard,
        ..SvmTrainer::default()
    };
    let (train_x, train_y, test_x, test_y) =
        train_test_split(samples.view(), &labels, TEST_RATIO, trainer.seed);
    info!(
        train_samples = train_x.nrows(),
        test_samples = test_x.nrows(),
        calibrated = trainer.probability,
        "fitting pairwise SVM machines"
    );
    let svm = trainer.fit(train_x.view(), &train_y)?;

    info!(
        train_accuracy = accuracy(&svm, train_x.view(), &train_y),
        "evaluated on the training split"
    );
    if test_y.is_empty() {
        info!("dataset too small for a held-out split, skipping evaluation");
    } else {
        info!(
            test_accuracy = accuracy(&svm, test_x.view(), &test_y),
            "evaluated on the held-out split"
        );
        let predicted = predict_labels(&svm, test_x.view());
        let matrix = confusion_matrix(&test_y, &predicted, svm.n_classes);
        info!(
            "confusion matrix, rows are truth:\n{}",
            render_confusion_matrix(&matrix, &mapping)
        );
    }

    fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("train - cannot create output directory {:?}", args.out_dir))?;
    let model_path = args.out_dir.join(format!("{}.bin", args.model_name));
    save_bundle(&model_path, &svm, &mapping)?;
    info!(
        path = %model_path.display(),
        elapsed_secs = started.elapsed().as_secs(),
        "model artifact written"
    );
    Ok(())
}
