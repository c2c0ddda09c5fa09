//! Progress reporting sink.

use std::sync::Arc;

use log::info;

/// Receives step headers and progress observations from the pipeline.
pub trait Reporter: Send + Sync {
    /// A new pipeline step begins.
    fn step(&self, index: usize, title: &str);

    /// A progress observation inside the current step.
    fn progress(&self, message: &str);
}

/// Reporter that forwards everything to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn step(&self, index: usize, title: &str) {
        info!("Step {}: {}", index, title);
    }

    fn progress(&self, message: &str) {
        info!("{}", message);
    }
}

impl<T: Reporter + ?Sized> Reporter for Arc<T> {
    fn step(&self, index: usize, title: &str) {
        (**self).step(index, title)
    }

    fn progress(&self, message: &str) {
        (**self).progress(message)
    }
}
