//! Power aggregation and normalisation modes.
//!
//! Inputs are per-epoch spectra `P[f, e]` (excluded epochs already NaN), the
//! state label of every epoch and a bin length in epochs.  Every mode yields
//! a `[n_freqs, n_states, n_bins]` table; unbinned modes have one bin.
//!
//! | mode               | value                                             |
//! |--------------------|---------------------------------------------------|
//! | `Raw`              | `S[f,s]`   mean spectrum of state `s`             |
//! | `RawBinned`        | `S[f,s,b]` same, per bin                          |
//! | `StateNorm`        | `100 · S[f,s] / Σ_f S[f,s]`                       |
//! | `StateNormBinned`  | `100 · S[f,s,b] / Σ_f S[f,s,b]`                   |
//! | `TotalNorm`        | `100 · S[f,s] / Σ_f G[f]`                         |
//! | `TotalNormBinned`  | `100 · S[f,s,b] / Σ_f G[f,b]`                     |
//! | `StateTotalBinned` | `100 · S[f,s,b] / Σ_f S[f,s]`                     |
//!
//! `G` is the mean spectrum over every usable epoch regardless of state.
//! All means skip NaN, so excluded epochs drop out instead of pulling the
//! average toward zero.
use std::collections::BTreeSet;
use std::ops::Range;

use ndarray::{Array1, Array2, Array3, Axis};

use crate::error::{Error, Result};
use crate::stats::nanmean;

const MODE_KEYWORDS: [&str; 4] = ["all", "bin", "normstate", "normtot"];
const BAND_KEYWORDS: [&str; 2] = ["bin", "state"];

/// Spectral aggregation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerMode {
    Raw,
    RawBinned,
    StateNorm,
    StateNormBinned,
    TotalNorm,
    TotalNormBinned,
    /// Per-bin state spectra as a percentage of the state's whole-recording
    /// total power.
    StateTotalBinned,
}

impl PowerMode {
    pub const ALL_MODES: [PowerMode; 7] = [
        PowerMode::Raw,
        PowerMode::RawBinned,
        PowerMode::StateNorm,
        PowerMode::StateNormBinned,
        PowerMode::TotalNorm,
        PowerMode::TotalNormBinned,
        PowerMode::StateTotalBinned,
    ];

    /// Select a mode from the keywords `bin`, `all`, `normstate`, `normtot`.
    ///
    /// ```
    /// use vigilance::PowerMode;
    /// assert_eq!(PowerMode::from_keywords(&["normstate", "bin"]).unwrap(), PowerMode::StateNormBinned);
    /// assert!(PowerMode::from_keywords(&["normtot", "normstate"]).is_err());
    /// ```
    pub fn from_keywords<S: AsRef<str>>(keywords: &[S]) -> Result<Self> {
        let set = keyword_set(keywords, &MODE_KEYWORDS)?;
        let set: Vec<&str> = set.iter().map(String::as_str).collect();
        match set.as_slice() {
            [] => Ok(Self::Raw),
            ["bin"] => Ok(Self::RawBinned),
            ["normstate"] => Ok(Self::StateNorm),
            ["bin", "normstate"] => Ok(Self::StateNormBinned),
            ["normtot"] => Ok(Self::TotalNorm),
            ["bin", "normtot"] => Ok(Self::TotalNormBinned),
            ["all", "bin", "normstate"] => Ok(Self::StateTotalBinned),
            _ => Err(Error::UnknownMode(set.iter().map(|s| s.to_string()).collect())),
        }
    }

    /// Keywords that select this mode (sorted).
    pub fn keywords(self) -> &'static [&'static str] {
        match self {
            Self::Raw => &[],
            Self::RawBinned => &["bin"],
            Self::StateNorm => &["normstate"],
            Self::StateNormBinned => &["bin", "normstate"],
            Self::TotalNorm => &["normtot"],
            Self::TotalNormBinned => &["bin", "normtot"],
            Self::StateTotalBinned => &["all", "bin", "normstate"],
        }
    }

    pub fn is_binned(self) -> bool {
        matches!(
            self,
            Self::RawBinned | Self::StateNormBinned | Self::TotalNormBinned | Self::StateTotalBinned
        )
    }
}

/// Band-power aggregation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BandMode {
    /// One value for the whole recording.
    Total,
    /// One value per bin.
    Binned,
    /// One value per state.
    ByState,
    /// One value per state and bin.
    ByStateBinned,
}

impl BandMode {
    /// Select a mode from the keywords `bin` and `state`.
    pub fn from_keywords<S: AsRef<str>>(keywords: &[S]) -> Result<Self> {
        let set = keyword_set(keywords, &BAND_KEYWORDS)?;
        Ok(match (set.contains("bin"), set.contains("state")) {
            (false, false) => Self::Total,
            (true, false) => Self::Binned,
            (false, true) => Self::ByState,
            (true, true) => Self::ByStateBinned,
        })
    }
}

fn keyword_set<S: AsRef<str>>(keywords: &[S], known: &[&str]) -> Result<BTreeSet<String>> {
    let set: BTreeSet<String> = keywords.iter().map(|k| k.as_ref().trim().to_lowercase()).collect();
    let unknown: Vec<String> = set.iter().filter(|k| !known.contains(&k.as_str())).cloned().collect();
    if unknown.is_empty() { Ok(set) } else { Err(Error::UnknownMode(unknown)) }
}

/// Aggregated spectra plus the state/bin groups that had no usable epoch.
#[derive(Debug, Clone)]
pub struct PowerTable {
    pub mode: PowerMode,
    pub freqs: Vec<f64>,
    /// `[n_freqs, n_states, n_bins]`.
    pub values: Array3<f64>,
    /// `(state code, bin)` groups without a single usable epoch.
    pub empty_groups: Vec<(u8, usize)>,
}

/// Column ranges of consecutive bins of `bin` epochs over `n` epochs.
///
/// `n` is expected to be a whole multiple of `bin`; a trailing partial bin
/// is dropped.
pub fn bin_ranges(n: usize, bin: usize) -> Vec<Range<usize>> {
    if bin == 0 {
        return Vec::new();
    }
    (0..n / bin).map(|b| b * bin..(b + 1) * bin).collect()
}

/// `[n_freqs, n_states]` NaN-aware mean spectrum per state over `cols`.
pub fn state_means(p: &Array2<f64>, labels: &[u8], nstates: usize, cols: Range<usize>) -> Array2<f64> {
    let mut out = Array2::from_elem((p.nrows(), nstates), f64::NAN);
    for s in 0..nstates {
        let members: Vec<usize> = cols.clone().filter(|&e| labels[e] as usize == s + 1).collect();
        for f in 0..p.nrows() {
            out[[f, s]] = nanmean(members.iter().map(|&e| p[[f, e]]));
        }
    }
    out
}

/// NaN-aware mean spectrum over `cols`, all states pooled.
pub fn grand_mean(p: &Array2<f64>, cols: Range<usize>) -> Array1<f64> {
    Array1::from_shape_fn(p.nrows(), |f| nanmean(cols.clone().map(|e| p[[f, e]])))
}

/// Apply `mode` to spectra `p` (`[n_freqs, n_epochs]`).
///
/// `labels.len()` must equal `p.ncols()`; `bin` is in epochs.
pub fn aggregate(mode: PowerMode, p: &Array2<f64>, labels: &[u8], nstates: usize, bin: usize) -> Result<Array3<f64>> {
    if labels.len() != p.ncols() {
        return Err(Error::LengthMismatch { what: "epoch labels", expected: p.ncols(), got: labels.len() });
    }
    let n = p.ncols();
    let state_total = state_means(p, labels, nstates, 0..n).sum_axis(Axis(0)); // [n_states]
    let ranges = if mode.is_binned() { bin_ranges(n, bin) } else { vec![0..n] };

    let mut out = Array3::from_elem((p.nrows(), nstates, ranges.len()), f64::NAN);
    for (b, r) in ranges.into_iter().enumerate() {
        let means = state_means(p, labels, nstates, r.clone());
        let values = match mode {
            PowerMode::Raw | PowerMode::RawBinned => means,
            PowerMode::StateNorm | PowerMode::StateNormBinned => {
                let t = means.sum_axis(Axis(0));
                percent_of(&means, |_, s| t[s])
            }
            PowerMode::TotalNorm | PowerMode::TotalNormBinned => {
                let g = grand_mean(p, r).sum();
                percent_of(&means, |_, _| g)
            }
            PowerMode::StateTotalBinned => percent_of(&means, |_, s| state_total[s]),
        };
        out.index_axis_mut(Axis(2), b).assign(&values);
    }
    Ok(out)
}

/// `(state, bin)` groups in which no epoch has a finite value.
pub fn empty_groups(usable: &[bool], labels: &[u8], nstates: usize, ranges: &[Range<usize>]) -> Vec<(u8, usize)> {
    let mut out = Vec::new();
    for (b, r) in ranges.iter().enumerate() {
        for s in 1..=nstates {
            if !r.clone().any(|e| usable[e] && labels[e] as usize == s) {
                out.push((s as u8, b));
            }
        }
    }
    out
}

/// Band-power table for `mode` from per-epoch band power `bp` (NaN = excluded).
///
/// Rows are `1` or `n_states`, columns `1` or `n_bins`.
pub fn band_table(mode: BandMode, bp: &[f64], labels: &[u8], nstates: usize, bin: usize) -> Result<Array2<f64>> {
    if labels.len() != bp.len() {
        return Err(Error::LengthMismatch { what: "epoch labels", expected: bp.len(), got: labels.len() });
    }
    let n = bp.len();
    let by_state = matches!(mode, BandMode::ByState | BandMode::ByStateBinned);
    let ranges = match mode {
        BandMode::Binned | BandMode::ByStateBinned => bin_ranges(n, bin),
        BandMode::Total | BandMode::ByState => vec![0..n],
    };
    let rows = if by_state { nstates } else { 1 };
    let mut out = Array2::from_elem((rows, ranges.len()), f64::NAN);
    for (b, r) in ranges.into_iter().enumerate() {
        for row in 0..rows {
            out[[row, b]] = nanmean(
                r.clone()
                    .filter(|&e| !by_state || labels[e] as usize == row + 1)
                    .map(|e| bp[e]),
            );
        }
    }
    Ok(out)
}

fn percent_of<F: Fn(usize, usize) -> f64>(m: &Array2<f64>, denom: F) -> Array2<f64> {
    Array2::from_shape_fn(m.dim(), |(f, s)| 100.0 * m[[f, s]] / denom(f, s))
}
