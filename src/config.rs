//! Analysis configuration.
//!
//! [`AnalysisConfig`] holds every tunable parameter of the hypnogram and
//! spectral engines.  It is resolved once from three layers:
//!
//! 1. built-in defaults ([`AnalysisConfig::default`]),
//! 2. an optional JSON override file ([`AnalysisConfig::from_json_file`]),
//! 3. explicit `key=value` overrides ([`AnalysisConfig::apply_override`]).
//!
//! [`AnalysisConfig::layered`] runs all three and validates the result.
//! Unknown keys are rejected in both the file and the key/value layer.
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::window::WindowKind;

/// Upper bound on the number of vigilance states (one-digit key bindings).
pub const MAX_STATES: usize = 9;

/// A vigilance state: display name plus its 1-based hypnogram code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct State {
    pub name: String,
    pub code: u8,
}

/// Named frequency bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Band {
    Delta,
    Theta,
    Alpha,
    Sigma,
    Beta,
    Gamma,
    All,
}

impl Band {
    pub const ALL_BANDS: [Band; 7] = [
        Band::Delta,
        Band::Theta,
        Band::Alpha,
        Band::Sigma,
        Band::Beta,
        Band::Gamma,
        Band::All,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Band::Delta => "delta",
            Band::Theta => "theta",
            Band::Alpha => "alpha",
            Band::Sigma => "sigma",
            Band::Beta => "beta",
            Band::Gamma => "gamma",
            Band::All => "all",
        }
    }
}

impl FromStr for Band {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Band::ALL_BANDS
            .into_iter()
            .find(|b| b.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::UnknownBand(s.to_string()))
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `[lo, hi]` Hz limits of every named band.
///
/// Band windows are independent of the frequency-of-interest range
/// (`hz_min`/`hz_max`): a band may reach beyond it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Bands {
    pub delta: [f64; 2],
    pub theta: [f64; 2],
    pub alpha: [f64; 2],
    pub sigma: [f64; 2],
    pub beta: [f64; 2],
    pub gamma: [f64; 2],
    pub all: [f64; 2],
}

impl Default for Bands {
    fn default() -> Self {
        Self {
            delta: [0.5, 4.0],
            theta: [4.0, 8.0],
            alpha: [8.0, 12.0],
            sigma: [12.0, 16.0],
            beta: [16.0, 30.0],
            gamma: [30.0, 48.0],
            all: [0.5, 48.0],
        }
    }
}

impl Bands {
    pub fn range(&self, band: Band) -> [f64; 2] {
        *self.slot(band)
    }

    pub fn set(&mut self, band: Band, range: [f64; 2]) {
        *self.slot_mut(band) = range;
    }

    fn slot(&self, band: Band) -> &[f64; 2] {
        match band {
            Band::Delta => &self.delta,
            Band::Theta => &self.theta,
            Band::Alpha => &self.alpha,
            Band::Sigma => &self.sigma,
            Band::Beta => &self.beta,
            Band::Gamma => &self.gamma,
            Band::All => &self.all,
        }
    }

    fn slot_mut(&mut self, band: Band) -> &mut [f64; 2] {
        match band {
            Band::Delta => &mut self.delta,
            Band::Theta => &mut self.theta,
            Band::Alpha => &mut self.alpha,
            Band::Sigma => &mut self.sigma,
            Band::Beta => &mut self.beta,
            Band::Gamma => &mut self.gamma,
            Band::All => &mut self.all,
        }
    }
}

/// What to do when a marker fragment is not a whole number of kernels long.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FragmentPolicy {
    /// Round the end up with real trailing samples; where the recording ends
    /// first, fall back to the whole kernels that fit in the available data.
    #[default]
    Extend,
    /// Round the end down to whole kernels.
    Truncate,
    /// Reject fragments that are not already a whole number of kernels.
    Error,
}

impl FromStr for FragmentPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "extend" => Ok(Self::Extend),
            "truncate" => Ok(Self::Truncate),
            "error" => Ok(Self::Error),
            other => Err(Error::param(
                "fragment_policy",
                format!("`{other}` is not one of extend, truncate, error"),
            )),
        }
    }
}

/// Configuration for hypnogram statistics and spectral analysis.
///
/// All fields are `pub`, so struct-update syntax works:
///
/// ```
/// use vigilance::AnalysisConfig;
///
/// let cfg = AnalysisConfig {
///     epoch_sec: 10.0,
///     block: 360,          // one-hour blocks of 10 s epochs
///     ..AnalysisConfig::default()
/// };
/// assert!(cfg.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    /// Epoch duration in seconds; the unit of hypnogram scoring.
    ///
    /// Default: `4.0` s.
    pub epoch_sec: f64,

    /// Epochs per block for blocked statistics and binned power modes.
    ///
    /// `0` treats the whole hypnogram as a single block.
    ///
    /// Default: `0`.
    pub block: usize,

    /// Welch kernel (segment) length in seconds.  Fixes the frequency
    /// resolution at `1 / kernel_sec` Hz.  Must not exceed `epoch_sec`.
    ///
    /// Default: `2.0` s.
    pub kernel_sec: f64,

    /// Fractional overlap of consecutive Welch segments, in `[0, 1)`.
    ///
    /// Default: `0.5`.
    pub kernel_overlap: f64,

    /// Window applied to each Welch segment.
    ///
    /// Default: hann.
    pub window: WindowKind,

    /// Kaiser shape parameter β, read only when `window` is kaiser.
    ///
    /// Default: `0.5`.
    pub kaiser_beta: f64,

    /// Lower edge of the frequency-of-interest window in Hz.
    ///
    /// Default: `0.5` Hz.
    pub hz_min: f64,

    /// Upper edge of the frequency-of-interest window in Hz.
    ///
    /// Default: `30.0` Hz.
    pub hz_max: f64,

    /// Named frequency bands.
    pub bands: Bands,

    /// State names; the position (1-based) is the hypnogram code.
    ///
    /// Default: `["Wake", "NREM", "REM"]`.
    pub states: Vec<String>,

    /// Marker tags whose epochs are blanked from every power aggregate.
    ///
    /// Default: `["Art"]`.
    pub excluded_tags: Vec<String>,

    /// Width of event-frequency histogram bins in hours.
    ///
    /// Default: `1.0` h.
    pub bin_hours: f64,

    /// Events starting less than this many seconds into an epoch whose state
    /// differs from the previous epoch are flagged for double-checking.
    ///
    /// Default: `1.0` s.
    pub min_pad_sec: f64,

    /// Padding rule for marker fragments (see [`FragmentPolicy`]).
    pub fragment_policy: FragmentPolicy,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            epoch_sec: 4.0,
            block: 0,
            kernel_sec: 2.0,
            kernel_overlap: 0.5,
            window: WindowKind::Hann,
            kaiser_beta: 0.5,
            hz_min: 0.5,
            hz_max: 30.0,
            bands: Bands::default(),
            states: vec!["Wake".into(), "NREM".into(), "REM".into()],
            excluded_tags: vec!["Art".into()],
            bin_hours: 1.0,
            min_pad_sec: 1.0,
            fragment_policy: FragmentPolicy::Extend,
        }
    }
}

impl AnalysisConfig {
    /// Defaults overlaid with the fields present in a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Defaults overlaid with the fields present in a JSON document.
    ///
    /// Unknown fields are a configuration error.
    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| {
            let msg = e.to_string();
            match unknown_field_name(&msg) {
                Some(key) => Error::UnknownKey(key),
                None => Error::Json(e),
            }
        })
    }

    /// Resolve defaults → optional file → explicit overrides, then validate.
    pub fn layered(file: Option<&Path>, overrides: &[(String, String)]) -> Result<Self> {
        let mut cfg = match file {
            Some(path) => Self::from_json_file(path)?,
            None => Self::default(),
        };
        for (key, value) in overrides {
            cfg.apply_override(key, value)?;
        }
        cfg.validate()?;
        Ok(cfg)
    }

    /// Set one field from its textual form.
    ///
    /// List fields (`states`, `excluded_tags`) take comma-separated values;
    /// bands are addressed as `bands.<name>` with a `lo,hi` value.
    pub fn apply_override(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "epoch_sec" => self.epoch_sec = parse_num("epoch_sec", value)?,
            "block" => self.block = parse_num("block", value)?,
            "kernel_sec" => self.kernel_sec = parse_num("kernel_sec", value)?,
            "kernel_overlap" => self.kernel_overlap = parse_num("kernel_overlap", value)?,
            "window" => self.window = value.parse()?,
            "kaiser_beta" => self.kaiser_beta = parse_num("kaiser_beta", value)?,
            "hz_min" => self.hz_min = parse_num("hz_min", value)?,
            "hz_max" => self.hz_max = parse_num("hz_max", value)?,
            "states" => self.states = parse_list(value),
            "excluded_tags" => self.excluded_tags = parse_list(value),
            "bin_hours" => self.bin_hours = parse_num("bin_hours", value)?,
            "min_pad_sec" => self.min_pad_sec = parse_num("min_pad_sec", value)?,
            "fragment_policy" => self.fragment_policy = value.parse()?,
            _ => match key.strip_prefix("bands.") {
                Some(name) => {
                    let band: Band = name.parse()?;
                    let parts: Vec<f64> = value
                        .split(',')
                        .map(|p| parse_num("bands", p))
                        .collect::<Result<_>>()?;
                    let &[lo, hi] = parts.as_slice() else {
                        return Err(Error::param("bands", format!("`{value}` is not `lo,hi`")));
                    };
                    self.bands.set(band, [lo, hi]);
                }
                None => return Err(Error::UnknownKey(key.to_string())),
            },
        }
        Ok(())
    }

    /// Range checks for every field.
    pub fn validate(&self) -> Result<()> {
        if !(self.epoch_sec > 0.0) {
            return Err(Error::param("epoch_sec", format!("must be > 0, got {}", self.epoch_sec)));
        }
        if !(self.kernel_sec > 0.0) || self.kernel_sec > self.epoch_sec {
            return Err(Error::param(
                "kernel_sec",
                format!("must be in (0, epoch_sec = {}], got {}", self.epoch_sec, self.kernel_sec),
            ));
        }
        if !(0.0..1.0).contains(&self.kernel_overlap) {
            return Err(Error::param(
                "kernel_overlap",
                format!("must be in [0, 1), got {}", self.kernel_overlap),
            ));
        }
        if !(self.kaiser_beta >= 0.0) {
            return Err(Error::param("kaiser_beta", "must be >= 0"));
        }
        if !(self.hz_min >= 0.0) || !(self.hz_min <= self.hz_max) {
            return Err(Error::param(
                "hz_min",
                format!("need 0 <= hz_min <= hz_max, got [{}, {}]", self.hz_min, self.hz_max),
            ));
        }
        for band in Band::ALL_BANDS {
            let [lo, hi] = self.bands.range(band);
            if !(lo >= 0.0) || !(lo <= hi) {
                return Err(Error::param("bands", format!("{band}: need 0 <= lo <= hi, got [{lo}, {hi}]")));
            }
        }
        if self.states.is_empty() || self.states.len() > MAX_STATES {
            return Err(Error::param(
                "states",
                format!("need 1..={MAX_STATES} states, got {}", self.states.len()),
            ));
        }
        if !(self.bin_hours > 0.0) {
            return Err(Error::param("bin_hours", "must be > 0"));
        }
        if !(self.min_pad_sec >= 0.0) {
            return Err(Error::param("min_pad_sec", "must be >= 0"));
        }
        Ok(())
    }

    pub fn nstates(&self) -> usize {
        self.states.len()
    }

    /// States with their 1-based codes.
    pub fn state_list(&self) -> Vec<State> {
        self.states
            .iter()
            .enumerate()
            .map(|(i, name)| State { name: name.clone(), code: (i + 1) as u8 })
            .collect()
    }

    /// Histogram bin width in seconds.
    pub fn bin_sec(&self) -> f64 {
        self.bin_hours * 3600.0
    }
}

/// Split a `key=value` command-line override.
pub fn parse_override(s: &str) -> Result<(String, String)> {
    match s.split_once('=') {
        Some((k, v)) if !k.trim().is_empty() => Ok((k.trim().to_string(), v.trim().to_string())),
        _ => Err(Error::param("override", format!("`{s}` is not key=value"))),
    }
}

fn parse_num<T: FromStr>(name: &'static str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::param(name, format!("cannot parse `{value}`")))
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// serde reports `unknown field `x`, expected ...`; pull out `x`.
fn unknown_field_name(msg: &str) -> Option<String> {
    let rest = msg.strip_prefix("unknown field `")?;
    let end = rest.find('`')?;
    Some(rest[..end].to_string())
}
