use std::sync::Arc;

use tracing::Level;

/// Destination of the lines written by the logging policy.
pub trait LogSink: Send + Sync {
    fn log(&self, level: Level, message: &str);
}

/// Forwards log lines to `tracing` under the `azpipe::http` target.
#[derive(Debug, Default)]
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn log(&self, level: Level, message: &str) {
        match level {
            Level::ERROR => tracing::error!(target: "azpipe::http", "{message}"),
            Level::WARN => tracing::warn!(target: "azpipe::http", "{message}"),
            Level::INFO => tracing::info!(target: "azpipe::http", "{message}"),
            Level::DEBUG => tracing::debug!(target: "azpipe::http", "{message}"),
            _ => tracing::trace!(target: "azpipe::http", "{message}"),
        }
    }
}

/// Options shared by every policy of one pipeline, handed to each
/// [`PolicyFactory`](crate::PolicyFactory) at build time.
#[derive(Clone)]
pub struct PipelineOptions {
    log_sink: Arc<dyn LogSink>,
    min_log_level: Level,
}

impl PipelineOptions {
    pub fn new() -> Self {
        Self {
            log_sink: Arc::new(TracingLogSink),
            min_log_level: Level::INFO,
        }
    }

    pub fn log_sink(mut self, log_sink: Arc<dyn LogSink>) -> Self {
        self.log_sink = log_sink;
        self
    }

    /// Lines less severe than `level` are dropped.
    pub fn min_log_level(mut self, level: Level) -> Self {
        self.min_log_level = level;
        self
    }

    pub fn sink(&self) -> &Arc<dyn LogSink> {
        &self.log_sink
    }

    pub fn level(&self) -> Level {
        self.min_log_level
    }

    pub fn is_enabled(&self, level: Level) -> bool {
        // `Level` orders more verbose levels as greater.
        level <= self.min_log_level
    }

    pub fn log(&self, level: Level, message: &str) {
        if self.is_enabled(level) {
            self.log_sink.log(level, message);
        }
    }
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PipelineOptions {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("PipelineOptions")
            .field("min_log_level", &self.min_log_level)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use tracing::Level;

    use super::{LogSink, PipelineOptions};
    use crate::util::lock_unpoisoned;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<(Level, String)>>);

    impl LogSink for Recorder {
        fn log(&self, level: Level, message: &str) {
            lock_unpoisoned(&self.0).push((level, message.to_owned()));
        }
    }

    #[test]
    fn lines_below_the_minimum_level_are_dropped() {
        let recorder = Arc::new(Recorder::default());
        let options = PipelineOptions::new()
            .log_sink(recorder.clone())
            .min_log_level(Level::WARN);

        options.log(Level::ERROR, "kept error");
        options.log(Level::WARN, "kept warning");
        options.log(Level::INFO, "dropped info");
        options.log(Level::TRACE, "dropped trace");

        let lines = lock_unpoisoned(&recorder.0).clone();
        assert_eq!(
            lines,
            vec![
                (Level::ERROR, "kept error".to_owned()),
                (Level::WARN, "kept warning".to_owned()),
            ]
        );
    }
}
