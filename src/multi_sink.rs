//! Composite sink for sending each exchange line to several destinations.
//!
//! # Example
//!
//! ```rust
//! use traffic_tap::{LoggingSink, MultiSink};
//!
//! let sink = MultiSink::new().with(LoggingSink);
//! assert_eq!(sink.len(), 1);
//! ```

use std::sync::Arc;

use crate::{types::ExchangeLine, ExchangeSink};

/// A sink that forwards every line to each inner sink, in the order they were added.
#[derive(Clone, Default)]
pub struct MultiSink {
    sinks: Vec<Arc<dyn ExchangeSink>>,
}

impl MultiSink {
    /// Create a new empty MultiSink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sink to the chain. Returns self for builder pattern.
    pub fn with<K: ExchangeSink>(mut self, sink: K) -> Self {
        self.sinks.push(Arc::new(sink));
        self
    }

    /// Returns true if no sinks have been added.
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Returns the number of sinks in the chain.
    pub fn len(&self) -> usize {
        self.sinks.len()
    }
}

impl ExchangeSink for MultiSink {
    fn emit(&self, line: &ExchangeLine) {
        for sink in &self.sinks {
            sink.emit(line);
        }
    }
}
