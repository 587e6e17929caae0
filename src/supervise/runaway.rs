//! Runaway process detection.
//!
//! Keeps a short rolling window of CPU samples. A runaway verdict
//! requires a full window whose peak crosses the kill threshold and
//! whose bulk sits above the high-watermark threshold, so a single
//! spike during compilation does not kill the server.

use std::collections::VecDeque;

use crate::config::RunawayConfig;

pub struct RunawayDetector {
    config: RunawayConfig,
    samples: VecDeque<f64>,
}

impl RunawayDetector {
    pub fn new(config: RunawayConfig) -> Self {
        let capacity = config.window;
        Self {
            config,
            samples: VecDeque::with_capacity(capacity),
        }
    }

    /// Record one CPU sample and report whether the window is runaway.
    pub fn record(&mut self, cpu_percent: f64) -> bool {
        self.samples.push_back(cpu_percent);
        while self.samples.len() > self.config.window {
            self.samples.pop_front();
        }
        self.is_runaway()
    }

    fn is_runaway(&self) -> bool {
        if self.samples.len() < self.config.window {
            return false;
        }

        let peak = self.samples.iter().cloned().fold(f64::MIN, f64::max);
        let high_samples = self
            .samples
            .iter()
            .filter(|&&cpu| cpu >= self.config.high_threshold)
            .count();

        peak >= self.config.kill_threshold && high_samples >= self.config.min_high_samples
    }
}
