//! Blocked hypnogram statistics.
//!
//! A hypnogram is one 1-based state code per epoch.  Statistics are computed
//! per state and per block of `block` epochs; the sequence is trimmed to a
//! whole number of blocks first (`nblocks = floor(len / block)`), and
//! `block == 0` makes the whole hypnogram a single block.
//!
//! Episodes are maximal runs of one state.  An episode starts at epoch 0 and
//! wherever the label differs from the previous one.
//!
//! Transitions are encoded as `2^(after−1) − 2^(before−1)`, which is unique
//! for every ordered pair of distinct states, so counting a transition is a
//! comparison of the per-epoch diff against one integer.
use log::debug;
use ndarray::Array2;

use crate::epoch::{block_matrix, n_blocks, resolve_block};
use crate::error::{Error, Result};
use crate::stats;

/// Largest state count the `i64` transition encoding supports.
pub const MAX_ENCODABLE_STATES: usize = 62;

/// Convert a raw numeric hypnogram (NaN = unscored) into state codes.
///
/// Every NaN position is reported in [`Error::MissingLabels`]; zero, negative,
/// fractional or oversized values in [`Error::InvalidLabels`].
pub fn labels_from_raw(raw: &[f64]) -> Result<Vec<u8>> {
    let missing: Vec<usize> = raw.iter().enumerate().filter(|(_, v)| v.is_nan()).map(|(i, _)| i).collect();
    if !missing.is_empty() {
        return Err(Error::MissingLabels(missing));
    }
    let invalid: Vec<usize> = raw
        .iter()
        .enumerate()
        .filter(|(_, &v)| v < 1.0 || v.fract() != 0.0 || v > u8::MAX as f64)
        .map(|(i, _)| i)
        .collect();
    if !invalid.is_empty() {
        return Err(Error::InvalidLabels(invalid));
    }
    Ok(raw.iter().map(|&v| v as u8).collect())
}

/// Signed code of the transition `before → after` (1-based states).
///
/// `None` when either state is 0 or beyond [`MAX_ENCODABLE_STATES`].
pub fn transition_code(before: u8, after: u8) -> Option<i64> {
    let bit = |s: u8| match s as usize {
        1..=MAX_ENCODABLE_STATES => Some(1_i64 << (s - 1)),
        _ => None,
    };
    Some(bit(after)? - bit(before)?)
}

/// Inverse of [`transition_code`]; `None` for 0 or a non-transition value.
pub fn decode_transition(code: i64) -> Option<(u8, u8)> {
    if code == 0 {
        return None;
    }
    let mag = code.unsigned_abs();
    let lo = mag.trailing_zeros();
    let sum = mag.checked_add(1_u64 << lo)?;
    if !sum.is_power_of_two() {
        return None;
    }
    let hi = sum.trailing_zeros();
    if hi as usize > MAX_ENCODABLE_STATES {
        return None;
    }
    let (lo, hi) = (lo as u8 + 1, hi as u8 + 1);
    Some(if code > 0 { (lo, hi) } else { (hi, lo) })
}

/// A maximal run of one state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Episode {
    pub state: u8,
    pub first_epoch: usize,
    pub n_epochs: usize,
}

impl Episode {
    pub fn last_epoch(&self) -> usize {
        self.first_epoch + self.n_epochs - 1
    }
}

/// Transition counts for every ordered pair of distinct states.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionTable {
    /// `(before, after)` per row.
    pub pairs: Vec<(u8, u8)>,
    /// `[n_pairs, nblocks]` counts.
    pub counts: Array2<usize>,
}

impl TransitionTable {
    pub fn before(&self) -> Vec<u8> {
        self.pairs.iter().map(|p| p.0).collect()
    }

    pub fn after(&self) -> Vec<u8> {
        self.pairs.iter().map(|p| p.1).collect()
    }

    /// Count per pair summed over blocks.
    pub fn totals(&self) -> Vec<usize> {
        self.counts.rows().into_iter().map(|r| r.sum()).collect()
    }
}

/// Per-state, per-block statistics over a label sequence.
#[derive(Debug, Clone)]
pub struct HypnogramAnalyzer {
    labels: Vec<u8>,
    nstates: usize,
    block: usize,
    nblocks: usize,
    epoch_sec: f64,
}

impl HypnogramAnalyzer {
    /// `block == 0` means one block spanning the whole hypnogram.
    pub fn new(labels: Vec<u8>, nstates: usize, block: usize, epoch_sec: f64) -> Result<Self> {
        if nstates == 0 || nstates > MAX_ENCODABLE_STATES {
            return Err(Error::param(
                "states",
                format!("need 1..={MAX_ENCODABLE_STATES} states, got {nstates}"),
            ));
        }
        if !(epoch_sec > 0.0) {
            return Err(Error::param("epoch_sec", format!("must be > 0, got {epoch_sec}")));
        }
        let zero: Vec<usize> = labels.iter().enumerate().filter(|(_, &l)| l == 0).map(|(i, _)| i).collect();
        if !zero.is_empty() {
            return Err(Error::InvalidLabels(zero));
        }
        let over: Vec<usize> = labels
            .iter()
            .enumerate()
            .filter(|(_, &l)| l as usize > nstates)
            .map(|(i, _)| i)
            .collect();
        if !over.is_empty() {
            return Err(Error::LabelOutOfRange { nstates, positions: over });
        }

        let resolved = resolve_block(block, labels.len());
        let nblocks = n_blocks(labels.len(), block);
        debug!(
            "hypnogram: {} epochs, {} states, {} blocks of {} epochs",
            labels.len(),
            nstates,
            nblocks,
            resolved
        );
        Ok(Self { labels, nstates, block: resolved, nblocks, epoch_sec })
    }

    /// Full, untrimmed label sequence.
    pub fn labels(&self) -> &[u8] {
        &self.labels
    }

    /// Labels that fall in whole blocks.
    pub fn trimmed(&self) -> &[u8] {
        &self.labels[..self.nblocks * self.block]
    }

    pub fn nstates(&self) -> usize {
        self.nstates
    }

    /// Epochs per block (resolved; never 0 for a non-empty hypnogram).
    pub fn block(&self) -> usize {
        self.block
    }

    pub fn nblocks(&self) -> usize {
        self.nblocks
    }

    pub fn epoch_sec(&self) -> f64 {
        self.epoch_sec
    }

    /// `[block, nblocks]` label matrix, one block per column.
    pub fn block_matrix(&self) -> Array2<u8> {
        block_matrix(self.trimmed(), self.block)
    }

    /// `[nstates, nblocks]` epochs per state and block.
    pub fn state_epoch_counts(&self) -> Array2<usize> {
        let m = self.block_matrix();
        Array2::from_shape_fn((self.nstates, self.nblocks), |(s, b)| {
            m.column(b).iter().filter(|&&l| l as usize == s + 1).count()
        })
    }

    /// `[nstates, nblocks]` seconds per state and block.
    pub fn state_total_durations(&self) -> Array2<f64> {
        self.state_epoch_counts().mapv(|c| c as f64 * self.epoch_sec)
    }

    /// `[nstates, nblocks]` fraction of each block spent in each state.
    pub fn state_proportions(&self) -> Array2<f64> {
        let counts = self.state_epoch_counts();
        let mut out = counts.mapv(|c| c as f64);
        for mut col in out.columns_mut() {
            let total: f64 = col.sum();
            if total > 0.0 {
                col.mapv_inplace(|v| v / total);
            } else {
                col.fill(f64::NAN);
            }
        }
        out
    }

    /// Maximal constant runs over the full label sequence, in order.
    pub fn episodes(&self) -> Vec<Episode> {
        let mut out = Vec::new();
        let mut current: Option<Episode> = None;
        for (i, &l) in self.labels.iter().enumerate() {
            match current.as_mut() {
                Some(ep) if ep.state == l => ep.n_epochs += 1,
                _ => {
                    if let Some(ep) = current.take() {
                        out.push(ep);
                    }
                    current = Some(Episode { state: l, first_epoch: i, n_epochs: 1 });
                }
            }
        }
        out.extend(current);
        out
    }

    /// `[nstates, nblocks]` episodes starting in each block.
    pub fn state_episode_counts(&self) -> Array2<usize> {
        let mut out = Array2::<usize>::zeros((self.nstates, self.nblocks));
        let labels = self.trimmed();
        for (i, &l) in labels.iter().enumerate() {
            if i == 0 || labels[i - 1] != l {
                out[[l as usize - 1, i / self.block]] += 1;
            }
        }
        out
    }

    /// `[nstates, nblocks]` episode durations in seconds, in order.
    ///
    /// A run is filed under the block holding its **last** epoch, so a run
    /// crossing a block boundary counts toward the later block.  Runs ending
    /// in the discarded partial block appear in no cell.
    pub fn state_episode_durations(&self) -> Array2<Vec<f64>> {
        let mut out = Array2::from_elem((self.nstates, self.nblocks), Vec::new());
        if self.block == 0 {
            return out;
        }
        for ep in self.episodes() {
            let b = ep.last_epoch() / self.block;
            if b < self.nblocks {
                out[[ep.state as usize - 1, b]].push(ep.n_epochs as f64 * self.epoch_sec);
            }
        }
        out
    }

    /// Mean episode duration per cell; NaN for cells without episodes.
    pub fn state_episode_duration_mean(&self) -> Array2<f64> {
        self.state_episode_durations().map(|d| stats::mean(d))
    }

    /// Sample standard deviation of episode durations per cell.
    pub fn state_episode_duration_std(&self) -> Array2<f64> {
        self.state_episode_durations().map(|d| stats::std(d))
    }

    /// Ordered state pairs: for each `before`, `after` cycles through the
    /// other states starting at `before + 1` and wrapping.
    pub fn transition_pairs(&self) -> Vec<(u8, u8)> {
        let n = self.nstates;
        (0..n)
            .flat_map(|b| (1..n).map(move |k| ((b + 1) as u8, ((b + k) % n + 1) as u8)))
            .collect()
    }

    /// Per-epoch transition codes; epoch 0 has no predecessor and gets 0.
    pub fn transition_diffs(&self) -> Vec<i64> {
        let labels = self.trimmed();
        (0..labels.len())
            .map(|i| match i {
                0 => 0,
                _ => transition_code(labels[i - 1], labels[i]).unwrap_or(0),
            })
            .collect()
    }

    /// Transition counts per ordered pair and block.  A transition belongs to
    /// the block of the epoch it enters.
    pub fn state_transitions(&self) -> TransitionTable {
        let pairs = self.transition_pairs();
        let diffs = self.transition_diffs();
        let dm = block_matrix(&diffs, self.block);
        let counts = Array2::from_shape_fn((pairs.len(), self.nblocks), |(p, b)| {
            match transition_code(pairs[p].0, pairs[p].1) {
                Some(code) => dm.column(b).iter().filter(|&&d| d == code).count(),
                None => 0,
            }
        });
        TransitionTable { pairs, counts }
    }
}
