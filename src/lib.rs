//! EEG acquisition client built around a multi-channel, time-indexed stream
//! buffer.
//!
//! A [`StreamController`] connects a [`StreamSource`] (synthetic signal, CSV
//! replay, TCP or LSL), creates one channel per source channel and runs an
//! ingestion worker that appends every frame to a shared [`StreamBuffer`].
//! Query clients hold an `Arc<StreamBuffer>` and read owned copies of the
//! latest sample or of a time window while ingestion continues.

pub mod config;
pub mod streaming;

pub use config::{ClientConfig, ConfigError};
pub use streaming::{
    AcquisitionState, Sample, StreamBuffer, StreamController, StreamControllerConfig,
    StreamError, StreamResult, StreamSource, StreamSourceConfig, Window,
};
