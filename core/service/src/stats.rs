// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Per-method counters reported on `$SRV.STATS`. Times are nanoseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodStats {
    pub num_requests: u64,
    pub num_errors: u64,
    pub last_error: String,
    pub processing_time: u64,
    pub average_processing_time: u64,
}

impl MethodStats {
    pub fn record(&mut self, error: Option<&str>, elapsed_ns: u64) {
        self.num_requests += 1;
        if let Some(error) = error {
            self.num_errors += 1;
            self.last_error = error.to_string();
        }
        self.processing_time = self.processing_time.saturating_add(elapsed_ns);
        self.average_processing_time =
            (self.processing_time as f64 / self.num_requests as f64).round() as u64;
    }
}

#[derive(Debug, Clone, Default)]
pub struct StatsRegistry {
    methods: Arc<Mutex<HashMap<String, MethodStats>>>,
}

impl StatsRegistry {
    pub fn new() -> Self {
        StatsRegistry::default()
    }

    pub fn record(&self, method: &str, error: Option<&str>, elapsed_ns: u64) {
        self.methods
            .lock()
            .entry(method.to_string())
            .or_default()
            .record(error, elapsed_ns);
    }

    /// Stats of `method`, zeroed if it was never called.
    pub fn get(&self, method: &str) -> MethodStats {
        self.methods.lock().get(method).cloned().unwrap_or_default()
    }
}
