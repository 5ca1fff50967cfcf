//! Data structures for probe data.
//!
//! This module contains the identity of a probe, its cached telemetry
//! reading, and the flattened record handed to display and log consumers.

pub mod identity;
pub mod reading;
pub mod record;

pub use identity::ProbeIdentity;
pub use reading::ProbeReading;
pub use record::ProbeRecord;
