pub mod location;
pub mod signal;

pub use location::{LocationSample, Provider};
pub use signal::{CellLocation, DataConnectionState, SignalSnapshot, SignalStrengths};
