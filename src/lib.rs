//! Duty-cycled logger for device location and cellular signal quality.
//!
//! Platform callbacks feed a [`RadioSignalTracker`] and a [`FixMailbox`]; the
//! [`SamplerController`] polls them on a listen/sleep schedule, runs each
//! candidate through [`SampleAdmission`] and persists accepted rows in the
//! [`TimeSeriesStore`].

pub mod db;
pub mod models;
pub mod sensing;
pub mod settings;
pub mod utils;

pub use db::{DumpOutcome, PersistedRecord, TimeSeriesStore};
pub use models::{LocationSample, Provider, SignalSnapshot};
pub use sensing::{
    AdmissionResult, DutyCycleConfig, Environment, FixMailbox, LocationSource,
    RadioSignalTracker, RadioSource, Rejection, SampleAdmission, SamplerContext,
    SamplerController, SamplerState,
};
pub use settings::{SamplingSettings, SettingsStore};
