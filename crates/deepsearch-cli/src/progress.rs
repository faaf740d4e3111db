//! Progress reporting for long-running asks

use deepsearch_core::ProgressEvent;
use std::io::{self, Write};

/// Single-line step display on stderr, rewritten in place
pub struct ProgressReporter {
    enabled: bool,
    last_len: usize,
}

impl ProgressReporter {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            last_len: 0,
        }
    }

    pub fn update(&mut self, event: &ProgressEvent) {
        if !self.enabled {
            return;
        }
        let line = format!(
            "[{}/{}] {}",
            event.step_index + 1,
            event.total_steps,
            event.message
        );
        eprint!("\r{:<width$}", line, width = self.last_len.max(line.len()));
        io::stderr().flush().ok();
        self.last_len = line.len();
    }

    pub fn finish(&self) {
        if self.enabled && self.last_len > 0 {
            eprint!("\r{:<width$}\r", "", width = self.last_len);
            io::stderr().flush().ok();
        }
    }
}
