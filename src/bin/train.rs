//! Command line tool for training a tagger on a CoNLL-formatted corpus

use anyhow::Result;
use burn::backend::{ndarray::NdArrayDevice, Autodiff, NdArray};
use pico_args::Arguments;
use sequence_tagger::{
    datasets::{conll, Embeddings, Vocab},
    pipelines::sequence_labeling::{evaluation, inference, training, Batcher, TaggerConfig},
    utils::reporter::LogReporter,
};

const HELP: &str = "\
Usage: train [OPTIONS]

Options:
  -h, --help           Print help
  -d, --data-dir       The path to the top-level data directory (defaults to 'data')
  -o, --output         The artifact directory (defaults to '<data-dir>/model')
  -n, --num-epochs     Maximum number of epochs
  -b, --batch-size     Batch size
  --optimizer          One of sgd, adam, adagrad, rmsprop
  --no-chars           Disable the character-level representation
  --no-crf             Use independent per-token classification instead of the CRF
  --reload             Warm-start from the last checkpoint
";

#[derive(Debug)]
struct Args {
    help: bool,
    data_dir: String,
    output: Option<String>,
    num_epochs: Option<usize>,
    batch_size: Option<usize>,
    optimizer: Option<String>,
    no_chars: bool,
    no_crf: bool,
    reload: bool,
}

fn parse_args() -> Result<Args, pico_args::Error> {
    let mut pargs = Arguments::from_env();

    let args = Args {
        help: pargs.contains(["-h", "--help"]),
        data_dir: pargs
            .opt_value_from_str(["-d", "--data-dir"])?
            .unwrap_or_else(|| "data".to_string()),
        output: pargs.opt_value_from_str(["-o", "--output"])?,
        num_epochs: pargs.opt_value_from_str(["-n", "--num-epochs"])?,
        batch_size: pargs.opt_value_from_str(["-b", "--batch-size"])?,
        optimizer: pargs.opt_value_from_str("--optimizer")?,
        no_chars: pargs.contains("--no-chars"),
        no_crf: pargs.contains("--no-crf"),
        reload: pargs.contains("--reload"),
    };

    Ok(args)
}

#[tokio::main]
async fn main() -> Result<()> {
    pretty_env_logger::init();

    let args = parse_args()?;

    if args.help {
        println!("{}", HELP);
        return Ok(());
    }

    log::info!(
        "training the {} pipeline",
        sequence_tagger::pipelines::sequence_labeling::PIPELINE
    );

    let data_dir = &args.data_dir;
    let artifact_dir = args
        .output
        .unwrap_or_else(|| format!("{data_dir}/model"));

    let words = Vocab::load(&format!("{data_dir}/words.txt")).await?;
    let tags = Vocab::load(&format!("{data_dir}/tags.txt")).await?;
    let chars = if args.no_chars {
        None
    } else {
        Some(Vocab::load(&format!("{data_dir}/chars.txt")).await?)
    };

    let train_set = conll::Dataset::load(
        &format!("{data_dir}/train.txt"),
        &words,
        &tags,
        chars.as_ref(),
    )
    .await?;
    let valid_set = conll::Dataset::load(
        &format!("{data_dir}/valid.txt"),
        &words,
        &tags,
        chars.as_ref(),
    )
    .await?;

    let embeddings_path = format!("{data_dir}/embeddings.txt");
    let embeddings = if std::path::Path::new(&embeddings_path).exists() {
        Some(Embeddings::load(&embeddings_path).await?)
    } else {
        log::warn!("no pretrained embeddings at {embeddings_path}, training from scratch");
        None
    };

    let mut model_config = TaggerConfig::new(words.len(), chars.as_ref().map_or(0, Vocab::len), tags.len())
        .with_use_chars(chars.is_some())
        .with_use_crf(!args.no_crf);

    if let Some(embeddings) = &embeddings {
        model_config.dim_word = embeddings.dim;
    }

    let mut config = training::Training::new().with_reload(args.reload);

    if let Some(num_epochs) = args.num_epochs {
        config.num_epochs = num_epochs;
    }

    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }

    if let Some(optimizer) = args.optimizer {
        config.optimizer = optimizer;
    }

    let device = NdArrayDevice::default();

    let metrics = training::train::<Autodiff<NdArray>, _>(
        &device,
        &train_set,
        &valid_set,
        &model_config,
        &config,
        embeddings.as_ref(),
        &tags,
        &artifact_dir,
        &mut LogReporter,
    )?;

    log::info!(
        "best validation: acc {:.2} f1 {:.2}",
        100.0 * metrics.accuracy,
        100.0 * metrics.f1
    );

    // Evaluate the best checkpoint on the test split when one is present
    let test_path = format!("{data_dir}/test.txt");
    if std::path::Path::new(&test_path).exists() {
        let test_set = conll::Dataset::load(&test_path, &words, &tags, chars.as_ref()).await?;

        let (model, model_config) = inference::load::<NdArray>(&device, &artifact_dir)?;
        let batcher = Batcher::<NdArray>::new(&model_config, device);
        let metrics =
            evaluation::evaluate(&model, &batcher, &test_set, &tags, config.batch_size)?;

        log::info!(
            "test: acc {:.2} f1 {:.2}",
            100.0 * metrics.accuracy,
            100.0 * metrics.f1
        );
    }

    Ok(())
}
