//! Command line tool for evaluating a trained tagger on a labeled corpus

use anyhow::Result;
use burn::backend::{ndarray::NdArrayDevice, NdArray};
use pico_args::Arguments;
use sequence_tagger::{
    datasets::{conll, Vocab},
    pipelines::sequence_labeling::{evaluation, inference, Batcher},
};

const HELP: &str = "\
Usage: evaluate [OPTIONS]

Options:
  -h, --help           Print help
  -d, --data-dir       The path to the top-level data directory (defaults to 'data')
  -m, --model-dir      The artifact directory (defaults to '<data-dir>/model')
  -c, --corpus         The corpus file to evaluate (defaults to '<data-dir>/test.txt')
  -b, --batch-size     Batch size
";

#[derive(Debug)]
struct Args {
    help: bool,
    data_dir: String,
    model_dir: Option<String>,
    corpus: Option<String>,
    batch_size: usize,
}

fn parse_args() -> Result<Args, pico_args::Error> {
    let mut pargs = Arguments::from_env();

    let args = Args {
        help: pargs.contains(["-h", "--help"]),
        data_dir: pargs
            .opt_value_from_str(["-d", "--data-dir"])?
            .unwrap_or_else(|| "data".to_string()),
        model_dir: pargs.opt_value_from_str(["-m", "--model-dir"])?,
        corpus: pargs.opt_value_from_str(["-c", "--corpus"])?,
        batch_size: pargs
            .opt_value_from_str(["-b", "--batch-size"])?
            .unwrap_or(20),
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

    let data_dir = &args.data_dir;
    let model_dir = args
        .model_dir
        .unwrap_or_else(|| format!("{data_dir}/model"));
    let corpus = args
        .corpus
        .unwrap_or_else(|| format!("{data_dir}/test.txt"));

    let device = NdArrayDevice::default();
    let (model, model_config) = inference::load::<NdArray>(&device, &model_dir)?;

    let words = Vocab::load(&format!("{data_dir}/words.txt")).await?;
    let tags = Vocab::load(&format!("{data_dir}/tags.txt")).await?;
    let chars = if model_config.use_chars {
        Some(Vocab::load(&format!("{data_dir}/chars.txt")).await?)
    } else {
        None
    };

    let dataset = conll::Dataset::load(&corpus, &words, &tags, chars.as_ref()).await?;

    let batcher = Batcher::<NdArray>::new(&model_config, device);
    let metrics = evaluation::evaluate(&model, &batcher, &dataset, &tags, args.batch_size)?;

    log::info!(
        "{corpus}: acc {:.2} p {:.2} r {:.2} f1 {:.2}",
        100.0 * metrics.accuracy,
        100.0 * metrics.precision,
        100.0 * metrics.recall,
        100.0 * metrics.f1
    );

    Ok(())
}
