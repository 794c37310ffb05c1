//! In-memory bar source for testing.

use crate::application::ports::{BarSource, BarSourceError};
use crate::domain::streaming::{Bar, BarSeries};

/// Bar source backed by a preloaded vector.
#[derive(Debug, Default, Clone)]
pub struct InMemoryBarSource {
    bars: Vec<Bar>,
}

impl InMemoryBarSource {
    /// Create a source that yields `bars` in order.
    #[must_use]
    pub const fn new(bars: Vec<Bar>) -> Self {
        Self { bars }
    }

    /// Append a bar.
    pub fn push(&mut self, bar: Bar) {
        self.bars.push(bar);
    }
}

impl BarSource for InMemoryBarSource {
    fn load(&self) -> Result<BarSeries, BarSourceError> {
        Ok(BarSeries::new(self.bars.clone()))
    }

    fn name(&self) -> &'static str {
        "InMemory"
    }
}
