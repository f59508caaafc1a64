//! Observation preparation and result post-processing

pub mod weighting;
pub mod observation_set;
pub mod assembler;
pub mod filter;

pub use weighting::{SnrWeight, UniformWeight, WeightPolicy, WeightingScheme};
pub use observation_set::{ObservationSet, ObservationSetBuilder};
pub use assembler::{EventAssembler, UplinkRecord};
pub use filter::{trimmed_centroid, TrackedEstimate};
