use std::fmt::Display;

use burn::{
    config::Config,
    data::dataset::Dataset,
    grad_clipping::GradientClippingConfig,
    module::AutodiffModule,
    optim::{AdaGradConfig, AdamConfig, GradientsParams, Optimizer, RmsPropConfig, SgdConfig},
    tensor::{backend::AutodiffBackend, ElementConversion},
    LearningRate,
};

use crate::{
    datasets::{Embeddings, Vocab},
    utils::reporter::{Event, Reporter},
};

use super::{
    evaluation::{self, Metrics},
    model, Batcher, Item, Tagger, TaggerConfig,
};

/// The supported optimizer kinds
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum OptimizerKind {
    /// Stochastic gradient descent
    Sgd,

    /// Adam
    Adam,

    /// Adagrad
    Adagrad,

    /// RMSProp
    RmsProp,
}

impl TryFrom<&str> for OptimizerKind {
    type Error = OptimizerError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "sgd" => Ok(OptimizerKind::Sgd),
            "adam" => Ok(OptimizerKind::Adam),
            "adagrad" => Ok(OptimizerKind::Adagrad),
            "rmsprop" => Ok(OptimizerKind::RmsProp),
            _ => Err(OptimizerError::Unknown(value.to_string())),
        }
    }
}

impl Display for OptimizerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            OptimizerKind::Sgd => "sgd",
            OptimizerKind::Adam => "adam",
            OptimizerKind::Adagrad => "adagrad",
            OptimizerKind::RmsProp => "rmsprop",
        };

        write!(f, "{}", name)
    }
}

/// Optimizer Error
#[derive(thiserror::Error, Debug)]
pub enum OptimizerError {
    /// No optimizer found for the given string
    #[error("no optimizer found for {0}")]
    Unknown(String),
}

/// Define configuration struct for the experiment
#[derive(Config)]
pub struct Training {
    /// Batch size
    #[config(default = 20)]
    pub batch_size: usize,

    /// Maximum number of epochs
    #[config(default = 15)]
    pub num_epochs: usize,

    /// Initial learning rate
    #[config(default = 1e-3)]
    pub learning_rate: LearningRate,

    /// Multiplicative learning rate decay applied after every epoch
    #[config(default = 0.9)]
    pub lr_decay: f64,

    /// Optimizer kind: one of sgd, adam, adagrad, rmsprop
    #[config(default = "\"adam\".to_string()")]
    pub optimizer: String,

    /// Global-norm gradient clipping threshold; zero or below disables
    #[config(default = -1.0)]
    pub clip: f64,

    /// Consecutive non-improving epochs tolerated before stopping early
    #[config(default = 3)]
    pub patience: usize,

    /// Warm-start from the last checkpoint before the first epoch
    #[config(default = false)]
    pub reload: bool,
}

/// What the training loop should do after an epoch's validation score
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The score matched or beat the best; the checkpoint should be saved
    Improved,

    /// No improvement, but patience is not exhausted yet
    Continue,

    /// Too many epochs without improvement; stop training
    Stop,
}

/// Tracks the best validation F1 and decides when to stop early. A tie with
/// the best score counts as an improvement and resets the counter.
#[derive(Debug)]
pub struct EarlyStopping {
    patience: usize,
    best: f64,
    stale: usize,
}

impl EarlyStopping {
    /// Create a tracker allowing `patience` consecutive non-improving epochs
    pub fn new(patience: usize) -> Self {
        Self {
            patience,
            best: f64::NEG_INFINITY,
            stale: 0,
        }
    }

    /// The best score seen so far
    pub fn best(&self) -> f64 {
        self.best
    }

    /// Record an epoch's score and decide how to proceed
    pub fn update(&mut self, score: f64) -> Decision {
        if score >= self.best {
            self.best = score;
            self.stale = 0;

            return Decision::Improved;
        }

        self.stale += 1;
        if self.stale > self.patience {
            Decision::Stop
        } else {
            Decision::Continue
        }
    }
}

/// Define train function
#[allow(clippy::too_many_arguments)]
pub fn train<B, D>(
    device: &B::Device,      // Device on which to perform computation
    dataset_train: &D,       // Training dataset
    dataset_valid: &D,       // Validation dataset
    model_config: &TaggerConfig, // Model architecture configuration
    config: &Training,       // Experiment configuration
    embeddings: Option<&Embeddings>, // Pretrained word embeddings
    tags: &Vocab,            // Tag vocabulary, for entity-level F1
    artifact_dir: &str,      // Directory to save model and config files
    reporter: &mut dyn Reporter, // Progress sink
) -> anyhow::Result<Metrics>
where
    B: AutodiffBackend,
    D: Dataset<Item>,
{
    // An unknown optimizer name must fail before any computation
    let kind = OptimizerKind::try_from(config.optimizer.as_str())?;

    let model: Tagger<B> = match embeddings {
        Some(embeddings) => model_config.init_with_embeddings(embeddings, device)?,
        None => model_config.init(device),
    };

    let model = if config.reload {
        model::load_checkpoint(model, artifact_dir, device)?
    } else {
        model
    };

    std::fs::create_dir_all(artifact_dir)?;
    model_config
        .save(format!("{artifact_dir}/config.json"))
        .map_err(|e| anyhow!("unable to save model config: {}", e))?;

    let clipping = (config.clip > 0.0).then(|| GradientClippingConfig::Norm(config.clip as f32));

    match kind {
        OptimizerKind::Sgd => {
            let optimizer = SgdConfig::new().with_gradient_clipping(clipping).init();
            fit(
                model,
                optimizer,
                device,
                dataset_train,
                dataset_valid,
                model_config,
                config,
                tags,
                artifact_dir,
                reporter,
            )
        }
        OptimizerKind::Adam => {
            let optimizer = AdamConfig::new().with_grad_clipping(clipping).init();
            fit(
                model,
                optimizer,
                device,
                dataset_train,
                dataset_valid,
                model_config,
                config,
                tags,
                artifact_dir,
                reporter,
            )
        }
        OptimizerKind::Adagrad => {
            let optimizer = AdaGradConfig::new().with_grad_clipping(clipping).init();
            fit(
                model,
                optimizer,
                device,
                dataset_train,
                dataset_valid,
                model_config,
                config,
                tags,
                artifact_dir,
                reporter,
            )
        }
        OptimizerKind::RmsProp => {
            let optimizer = RmsPropConfig::new().with_grad_clipping(clipping).init();
            fit(
                model,
                optimizer,
                device,
                dataset_train,
                dataset_valid,
                model_config,
                config,
                tags,
                artifact_dir,
                reporter,
            )
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn fit<B, D, O>(
    mut model: Tagger<B>,
    mut optimizer: O,
    device: &B::Device,
    dataset_train: &D,
    dataset_valid: &D,
    model_config: &TaggerConfig,
    config: &Training,
    tags: &Vocab,
    artifact_dir: &str,
    reporter: &mut dyn Reporter,
) -> anyhow::Result<Metrics>
where
    B: AutodiffBackend,
    D: Dataset<Item>,
    O: Optimizer<Tagger<B>, B>,
{
    let batcher = Batcher::<B>::new(model_config, device.clone());
    let batcher_valid = Batcher::<B::InnerBackend>::new(model_config, device.clone());

    let items: Vec<Item> = dataset_train.iter().collect();

    let mut learning_rate = config.learning_rate;
    let mut stopper = EarlyStopping::new(config.patience);
    let mut best_metrics = None;

    for epoch in 1..=config.num_epochs {
        reporter.report(Event::EpochStarted {
            epoch,
            num_epochs: config.num_epochs,
            learning_rate,
        });

        for (index, chunk) in items.chunks(config.batch_size.max(1)).enumerate() {
            let batch = batcher.batch(chunk)?;
            let output = model.forward(&batch)?;

            let loss: f64 = output.loss.clone().into_scalar().elem();
            if !loss.is_finite() {
                return Err(anyhow!(
                    "non-finite training loss {loss} in epoch {epoch}, batch {}",
                    index + 1
                ));
            }

            let grads = GradientsParams::from_grads(output.loss.backward(), &model);
            model = optimizer.step(learning_rate, model, grads);

            reporter.report(Event::BatchCompleted {
                epoch,
                iteration: index + 1,
                loss,
            });
        }

        let metrics = evaluation::evaluate(
            &model.valid(),
            &batcher_valid,
            dataset_valid,
            tags,
            config.batch_size,
        )?;
        reporter.report(Event::EpochEvaluated {
            epoch,
            metrics: metrics.clone(),
        });

        match stopper.update(metrics.f1) {
            Decision::Improved => {
                model::save_checkpoint(&model, artifact_dir)?;
                reporter.report(Event::NewBest {
                    epoch,
                    f1: metrics.f1,
                });
                best_metrics = Some(metrics);
            }
            Decision::Continue => {}
            Decision::Stop => {
                reporter.report(Event::EarlyStopped { epoch });
                break;
            }
        }

        learning_rate *= config.lr_decay;
    }

    best_metrics.ok_or_else(|| anyhow!("training requires at least one epoch"))
}
