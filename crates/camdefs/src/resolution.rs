//! Candidate capture resolutions and the default-pick rule.

use core::fmt;
use core::str::FromStr;

use thiserror::Error;

/// Width/height pair in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub const fn pixels(self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Whether the resolution fits inside `other` in both dimensions.
    pub const fn fits_within(self, other: Resolution) -> bool {
        self.width <= other.width && self.height <= other.height
    }

    /// Look up a `WIDTHxHEIGHT` string in the candidate list.
    pub fn candidate(text: &str) -> Option<Resolution> {
        let parsed: Resolution = text.parse().ok()?;
        CANDIDATE_RESOLUTIONS.iter().copied().find(|r| *r == parsed)
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Failure to parse a `WIDTHxHEIGHT` string.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid resolution '{0}', expected WIDTHxHEIGHT")]
pub struct ResolutionParseError(pub String);

impl FromStr for Resolution {
    type Err = ResolutionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ResolutionParseError(s.to_string());
        let (w, h) = s.trim().split_once(['x', 'X']).ok_or_else(err)?;
        let width = w.trim().parse().map_err(|_| err())?;
        let height = h.trim().parse().map_err(|_| err())?;
        Ok(Resolution { width, height })
    }
}

/// Resolutions probed on every device, descending by pixel count.
pub const CANDIDATE_RESOLUTIONS: [Resolution; 5] = [
    Resolution::new(2592, 1944),
    Resolution::new(2560, 1440),
    Resolution::new(1920, 1080),
    Resolution::new(1280, 720),
    Resolution::new(640, 480),
];

/// Resolution selected whenever the device supports it.
pub const PREFERRED_RESOLUTION: Resolution = Resolution::new(1280, 720);

/// Choose the default capture resolution among `supported`.
///
/// 1280x720 wins when present. Otherwise the first candidate, in descending
/// order, that fits inside 1280x720 and is supported. Otherwise the largest
/// supported entry. `None` only when `supported` is empty.
pub fn pick_default(supported: &[Resolution]) -> Option<Resolution> {
    if supported.contains(&PREFERRED_RESOLUTION) {
        return Some(PREFERRED_RESOLUTION);
    }
    CANDIDATE_RESOLUTIONS
        .iter()
        .copied()
        .filter(|candidate| candidate.fits_within(PREFERRED_RESOLUTION))
        .find(|candidate| supported.contains(candidate))
        .or_else(|| supported.iter().copied().max_by_key(|r| r.pixels()))
}
