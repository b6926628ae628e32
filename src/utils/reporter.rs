use burn::LearningRate;

use crate::pipelines::sequence_labeling::evaluation::Metrics;

/// A progress event emitted by the training loop
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A new epoch is starting
    EpochStarted {
        /// The 1-based epoch number
        epoch: usize,
        /// The configured number of epochs
        num_epochs: usize,
        /// The learning rate in effect for this epoch
        learning_rate: LearningRate,
    },

    /// A minibatch optimization step finished
    BatchCompleted {
        /// The 1-based epoch number
        epoch: usize,
        /// The 1-based minibatch number within the epoch
        iteration: usize,
        /// The training loss for the minibatch
        loss: f64,
    },

    /// Validation metrics for a finished epoch
    EpochEvaluated {
        /// The 1-based epoch number
        epoch: usize,
        /// The validation metrics
        metrics: Metrics,
    },

    /// The epoch's F1 matched or beat the best seen so far
    NewBest {
        /// The 1-based epoch number
        epoch: usize,
        /// The new best F1
        f1: f64,
    },

    /// Training stopped early after too many epochs without improvement
    EarlyStopped {
        /// The 1-based epoch number after which training stopped
        epoch: usize,
    },
}

/// An injected sink for training progress, in place of ambient global state
pub trait Reporter {
    /// Report a single progress event
    fn report(&mut self, event: Event);
}

/// A reporter that forwards events to the `log` facade
#[derive(Debug, Default)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn report(&mut self, event: Event) {
        match event {
            Event::EpochStarted {
                epoch,
                num_epochs,
                learning_rate,
            } => log::info!("epoch {epoch}/{num_epochs} (lr {learning_rate:.5})"),
            Event::BatchCompleted {
                epoch,
                iteration,
                loss,
            } => log::debug!("epoch {epoch} batch {iteration}: loss {loss:.4}"),
            Event::EpochEvaluated { epoch, metrics } => log::info!(
                "epoch {epoch}: acc {:.2} f1 {:.2}",
                100.0 * metrics.accuracy,
                100.0 * metrics.f1
            ),
            Event::NewBest { epoch, f1 } => {
                log::info!("epoch {epoch}: new best f1 {:.2}", 100.0 * f1);
            }
            Event::EarlyStopped { epoch } => {
                log::info!("early stopping after epoch {epoch} without improvement");
            }
        }
    }
}

/// A reporter that drops every event, for tests and quiet runs
#[derive(Debug, Default)]
pub struct Silent;

impl Reporter for Silent {
    fn report(&mut self, _event: Event) {}
}
