pub mod admission;
pub mod config;
pub mod controller;
pub mod loop_worker;
pub mod radio;
pub mod source;

pub use admission::{AdmissionResult, Rejection, SampleAdmission};
pub use config::{DutyCycleConfig, MAX_ALLOWED_DRIFT, MIN_LOCATION_INTERVAL_FLOOR};
pub use controller::SamplerController;
pub use loop_worker::{SamplerContext, SamplerState};
pub use radio::RadioSignalTracker;
pub use source::{Environment, FixMailbox, LocationSource, RadioSource};
