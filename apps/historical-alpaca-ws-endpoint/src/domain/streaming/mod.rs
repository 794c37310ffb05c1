//! Market Data Streaming Types
//!
//! Core domain types for replayed market data. A [`Bar`] is already in
//! Alpaca's minute-bar wire schema so the streamer can serialize it as-is,
//! and a [`BarSeries`] is the immutable, shared playback sequence.

mod bar;

pub use bar::{BAR_MESSAGE_TYPE, Bar, BarSeries};
