#![cfg_attr(docsrs, feature(doc_cfg))]
//! Fixed camera tables shared by the coordinator and the front ends.

pub mod exposure;
pub mod resolution;
pub mod trust;

pub use exposure::{format_as_fraction, nearest_stop_index, step_by, StopIndex, EXPOSURE_STOPS_US};
pub use resolution::{pick_default, Resolution, ResolutionParseError, CANDIDATE_RESOLUTIONS};
pub use trust::{is_manual_capable, manual_default, manual_limit, TRUST_MARKER};
