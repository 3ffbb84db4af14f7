//! Default sink that writes exchange lines through `tracing`.
//!
//! This module provides [`LoggingSink`], which emits every exchange at INFO level
//! under the `traffic_tap::exchange` target, so log routing and filtering stay with
//! whatever subscriber the application installs.

use tracing::info;

use crate::{types::ExchangeLine, ExchangeSink};

/// [`ExchangeSink`] that logs each exchange line with `tracing::info!`.
///
/// # Examples
///
/// ```rust
/// use traffic_tap::{ExchangeLoggerConfig, ExchangeLoggerLayer, LoggingSink};
///
/// let layer = ExchangeLoggerLayer::new(ExchangeLoggerConfig::default(), LoggingSink);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingSink;

impl ExchangeSink for LoggingSink {
    fn emit(&self, line: &ExchangeLine) {
        info!(target: "traffic_tap::exchange", "{line}");
    }
}
