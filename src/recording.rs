//! Recording-level composition.
//!
//! [`Recording`] owns the signal, the hypnogram, the marker registry and the
//! spectral estimator, and derives everything that depends on more than one
//! of them:
//!
//! * the exclusion mask (epochs touched by an excluded tag),
//! * the usable epoch count, `floor(N / (srate · epoch_sec))` intersected
//!   with the block-trimmed hypnogram, then cut to a whole number of blocks,
//! * masked, normalised power tables and per-marker spectra.
//!
//! Every mutator validates the new configuration, rebuilds the derived state
//! eagerly and leaves the recording unchanged on error.  Only the Welch
//! estimate is deferred until the next spectral read.
use std::ops::Range;
use std::sync::Arc;

use log::{debug, info, warn};
use ndarray::{Array2, Axis};

use crate::config::{AnalysisConfig, Band, FragmentPolicy};
use crate::epoch::{resolve_block, trim_to_blocks};
use crate::error::{Error, Result};
use crate::events::{EventRegistry, EventStates, Marker, TagFilter};
use crate::hypnogram::{HypnogramAnalyzer, TransitionTable};
use crate::normalize::{self, BandMode, PowerMode, PowerTable};
use crate::stats;
use crate::welch::{SpectralEstimator, SpectralParams};
use crate::window::WindowKind;

/// Every blocked hypnogram statistic in one bundle.
#[derive(Debug, Clone)]
pub struct HypnogramStats {
    pub epoch_counts: Array2<usize>,
    pub durations: Array2<f64>,
    pub proportions: Array2<f64>,
    pub episode_counts: Array2<usize>,
    pub episode_duration_mean: Array2<f64>,
    pub episode_duration_std: Array2<f64>,
    pub transitions: TransitionTable,
}

/// One spectrum per TOI marker.
#[derive(Debug, Clone)]
pub struct MarkerSpectra {
    pub freqs: Vec<f64>,
    /// `[n_foi, n_markers]`.
    pub values: Array2<f64>,
    /// Marker index of every column.
    pub markers: Vec<usize>,
    /// Sample range actually analysed per marker.
    pub fragments: Vec<Range<usize>>,
}

pub struct Recording {
    config: AnalysisConfig,
    signal: Arc<[f64]>,
    srate: f64,
    hypnogram: HypnogramAnalyzer,
    events: EventRegistry,
    spectral: SpectralEstimator,
    exclusion: Vec<bool>,
    n_used: usize,
}

impl Recording {
    pub fn new(
        signal: impl Into<Arc<[f64]>>,
        srate: f64,
        labels: Vec<u8>,
        markers: Vec<Marker>,
        config: AnalysisConfig,
    ) -> Result<Self> {
        config.validate()?;
        let signal: Arc<[f64]> = signal.into();
        let events = EventRegistry::new(markers, srate)?;
        let spectral = SpectralEstimator::new(signal.clone(), srate, SpectralParams::from_config(&config))?;
        let hypnogram = HypnogramAnalyzer::new(labels, config.nstates(), config.block, config.epoch_sec)?;
        info!(
            "recording: {} samples @ {srate} Hz, {} scored epochs, {} markers",
            signal.len(),
            hypnogram.labels().len(),
            events.len()
        );
        let mut rec = Self {
            config,
            signal,
            srate,
            hypnogram,
            events,
            spectral,
            exclusion: Vec::new(),
            n_used: 0,
        };
        rec.recompute();
        Ok(rec)
    }

    /// Rebuild every field derived from the current components.
    ///
    /// Idempotent; the Welch cache is left alone.
    pub fn recompute(&mut self) {
        let n_signal = self.spectral.n_epochs();
        let n_scored = self.hypnogram.labels().len();
        if n_signal != n_scored {
            warn!("signal holds {n_signal} epochs but the hypnogram has {n_scored}; using the overlap");
        }
        let n = n_signal.min(self.hypnogram.trimmed().len());
        self.n_used = trim_to_blocks(n, self.config.block);
        self.exclusion = self.events.exclusion_mask(&self.config.excluded_tags, self.n_used, self.config.epoch_sec);
        debug!(
            "recompute: {} usable epochs, {} excluded, bins of {} epochs",
            self.n_used,
            self.exclusion.iter().filter(|&&x| x).count(),
            self.bin_epochs()
        );
    }

    // ── Mutators ─────────────────────────────────────────────────────────

    /// Replace the whole configuration.
    pub fn set_config(&mut self, config: AnalysisConfig) -> Result<()> {
        config.validate()?;
        let hypnogram = HypnogramAnalyzer::new(
            self.hypnogram.labels().to_vec(),
            config.nstates(),
            config.block,
            config.epoch_sec,
        )?;
        self.spectral.set_params(SpectralParams::from_config(&config))?;
        self.hypnogram = hypnogram;
        self.config = config;
        self.recompute();
        Ok(())
    }

    fn update<F: FnOnce(&mut AnalysisConfig)>(&mut self, f: F) -> Result<()> {
        let mut cfg = self.config.clone();
        f(&mut cfg);
        self.set_config(cfg)
    }

    pub fn set_epoch_sec(&mut self, epoch_sec: f64) -> Result<()> {
        self.update(|c| c.epoch_sec = epoch_sec)
    }

    pub fn set_block(&mut self, block: usize) -> Result<()> {
        self.update(|c| c.block = block)
    }

    pub fn set_kernel(&mut self, kernel_sec: f64) -> Result<()> {
        self.update(|c| c.kernel_sec = kernel_sec)
    }

    pub fn set_kernel_overlap(&mut self, overlap: f64) -> Result<()> {
        self.update(|c| c.kernel_overlap = overlap)
    }

    pub fn set_window(&mut self, window: WindowKind) -> Result<()> {
        self.update(|c| c.window = window)
    }

    pub fn set_freq_range(&mut self, hz_min: f64, hz_max: f64) -> Result<()> {
        self.update(|c| {
            c.hz_min = hz_min;
            c.hz_max = hz_max;
        })
    }

    pub fn set_excluded_tags(&mut self, tags: Vec<String>) -> Result<()> {
        self.update(|c| c.excluded_tags = tags)
    }

    pub fn set_states(&mut self, states: Vec<String>) -> Result<()> {
        self.update(|c| c.states = states)
    }

    pub fn set_hypnogram(&mut self, labels: Vec<u8>) -> Result<()> {
        self.hypnogram = HypnogramAnalyzer::new(labels, self.config.nstates(), self.config.block, self.config.epoch_sec)?;
        self.recompute();
        Ok(())
    }

    pub fn set_toi(&mut self, toi: TagFilter) {
        self.events.set_toi(toi);
        self.recompute();
    }

    pub fn replace_tag(&mut self, old: &str, new: &str) -> usize {
        let n = self.events.replace_tag(old, new);
        self.recompute();
        n
    }

    pub fn add_marker(&mut self, marker: Marker) -> Result<()> {
        self.events.push(marker)?;
        self.recompute();
        Ok(())
    }

    // ── Snapshots ────────────────────────────────────────────────────────

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn srate(&self) -> f64 {
        self.srate
    }

    pub fn signal(&self) -> &[f64] {
        &self.signal
    }

    pub fn hypnogram(&self) -> &HypnogramAnalyzer {
        &self.hypnogram
    }

    pub fn events(&self) -> &EventRegistry {
        &self.events
    }

    pub fn markers(&self) -> &[Marker] {
        self.events.markers()
    }

    pub fn spectral(&self) -> &SpectralEstimator {
        &self.spectral
    }

    /// Per-epoch exclusion flags over the usable epochs.
    pub fn exclusion_mask(&self) -> &[bool] {
        &self.exclusion
    }

    /// Epochs that enter spectral aggregation.
    pub fn n_used_epochs(&self) -> usize {
        self.n_used
    }

    /// Epochs per bin for the binned power modes.
    pub fn bin_epochs(&self) -> usize {
        resolve_block(self.config.block, self.n_used)
    }

    /// State label of every usable epoch.
    pub fn epoch_states(&self) -> &[u8] {
        &self.hypnogram.labels()[..self.n_used]
    }

    /// Log-power spectrogram `[n_foi, n_epochs]` over the whole signal.
    pub fn spectrogram(&self) -> Array2<f64> {
        self.spectral.spectrogram()
    }

    pub fn power_density_curve(&self, epoch: usize) -> Result<(Vec<f64>, Vec<f64>)> {
        self.spectral.power_density_curve(epoch)
    }

    // ── Hypnogram and event statistics ───────────────────────────────────

    pub fn hypnogram_stats(&self) -> HypnogramStats {
        let h = &self.hypnogram;
        HypnogramStats {
            epoch_counts: h.state_epoch_counts(),
            durations: h.state_total_durations(),
            proportions: h.state_proportions(),
            episode_counts: h.state_episode_counts(),
            episode_duration_mean: h.state_episode_duration_mean(),
            episode_duration_std: h.state_episode_duration_std(),
            transitions: h.state_transitions(),
        }
    }

    /// Epoch and state of every TOI marker, with double-check flags.
    pub fn event_states(&self) -> Result<EventStates> {
        self.events
            .event_states(self.hypnogram.labels(), self.config.epoch_sec, self.config.min_pad_sec)
    }

    /// TOI events per epoch.
    pub fn events_per_epoch(&self) -> Result<Vec<usize>> {
        self.events.events_per_epoch(self.config.epoch_sec)
    }

    /// TOI events per histogram bin of `bin_hours`.
    pub fn events_per_bin(&self) -> Result<Vec<usize>> {
        self.events.events_per_bin(self.config.bin_sec())
    }

    // ── Spectral aggregation ─────────────────────────────────────────────

    /// FOI spectra over the usable epochs, excluded epochs set to NaN.
    pub fn masked_spectra(&self) -> Result<Array2<f64>> {
        let epochs: Vec<usize> = (0..self.n_used).collect();
        let mut p = self.spectral.spectra(Some(&epochs))?;
        for (mut col, &excluded) in p.axis_iter_mut(Axis(1)).zip(&self.exclusion) {
            if excluded {
                col.fill(f64::NAN);
            }
        }
        Ok(p)
    }

    /// Aggregated power spectra under `mode`.
    ///
    /// State/bin groups without a usable epoch are NaN and listed in
    /// [`PowerTable::empty_groups`].
    pub fn power(&self, mode: PowerMode) -> Result<PowerTable> {
        let p = self.masked_spectra()?;
        let labels = self.epoch_states();
        let nstates = self.config.nstates();
        let bin = self.bin_epochs();
        let values = normalize::aggregate(mode, &p, labels, nstates, bin)?;

        let ranges = if mode.is_binned() { normalize::bin_ranges(self.n_used, bin) } else { vec![0..self.n_used] };
        let usable: Vec<bool> = self.exclusion.iter().map(|&x| !x).collect();
        let empty_groups = normalize::empty_groups(&usable, labels, nstates, &ranges);
        if !empty_groups.is_empty() {
            warn!("{mode:?}: {} state/bin groups have no usable epoch", empty_groups.len());
        }
        Ok(PowerTable { mode, freqs: self.spectral.foi_frequencies(), values, empty_groups })
    }

    /// Same as [`power`](Self::power) with the mode picked from keywords.
    pub fn power_by_keywords<S: AsRef<str>>(&self, keywords: &[S]) -> Result<PowerTable> {
        self.power(PowerMode::from_keywords(keywords)?)
    }

    /// Per-epoch mean power in `band` over the usable epochs (NaN = excluded).
    pub fn epoch_band_power(&self, band: Band) -> Vec<f64> {
        let mut bp = self.spectral.band_power(self.config.bands.range(band));
        bp.truncate(self.n_used);
        for (v, &excluded) in bp.iter_mut().zip(&self.exclusion) {
            if excluded {
                *v = f64::NAN;
            }
        }
        bp
    }

    /// Band-power table: rows are one or per state, columns one or per bin.
    pub fn band_power_table(&self, band: Band, mode: BandMode) -> Result<Array2<f64>> {
        let bp = self.epoch_band_power(band);
        normalize::band_table(mode, &bp, self.epoch_states(), self.config.nstates(), self.bin_epochs())
    }

    // ── Marker spectra ───────────────────────────────────────────────────

    /// Sample range analysed for marker `index`, padded per the fragment policy.
    pub fn fragment_range(&self, index: usize) -> Result<Range<usize>> {
        let m = self
            .events
            .markers()
            .get(index)
            .ok_or_else(|| Error::param("marker", format!("index {index} out of range")))?;
        let fail = |reason: String| Error::Fragment { index, start: m.start, finish: m.finish, reason };
        let n = self.signal.len();
        if m.finish >= n {
            return Err(fail(format!("ends past the recording ({n} samples)")));
        }
        let kernel = self.spectral.kernel_samples();
        let len = m.finish - m.start + 1;
        let rem = len % kernel;
        if rem == 0 {
            return Ok(m.start..m.start + len);
        }
        match self.config.fragment_policy {
            FragmentPolicy::Extend => {
                let wanted = len + kernel - rem;
                if m.start + wanted <= n {
                    return Ok(m.start..m.start + wanted);
                }
                let whole = (n - m.start) / kernel * kernel;
                if whole == 0 {
                    return Err(fail(format!("fewer than {kernel} samples left before the recording ends")));
                }
                Ok(m.start..m.start + whole)
            }
            FragmentPolicy::Truncate => {
                if len < kernel {
                    return Err(fail(format!("shorter than one kernel ({kernel} samples)")));
                }
                Ok(m.start..m.start + len - rem)
            }
            FragmentPolicy::Error => Err(fail(format!("length {len} is not a multiple of the kernel ({kernel})"))),
        }
    }

    /// One Welch spectrum per TOI marker, each fragment treated as a single
    /// epoch.
    pub fn marker_spectra(&self) -> Result<MarkerSpectra> {
        let markers = self.events.toi_indices();
        let freqs = self.spectral.foi_frequencies();
        let params = SpectralParams { epoch_sec: 0.0, ..SpectralParams::from_config(&self.config) };
        let mut values = Array2::<f64>::zeros((freqs.len(), markers.len()));
        let mut fragments = Vec::with_capacity(markers.len());
        for (col, &i) in markers.iter().enumerate() {
            let range = self.fragment_range(i)?;
            let fragment: Arc<[f64]> = self.signal[range.clone()].into();
            let est = SpectralEstimator::new(fragment, self.srate, params.clone())?;
            let s = est.spectra(None)?;
            values.column_mut(col).assign(&s.column(0));
            fragments.push(range);
        }
        Ok(MarkerSpectra { freqs, values, markers, fragments })
    }

    /// RMS of every marker's raw fragment, stored on the markers as well.
    pub fn marker_rms(&mut self) -> Result<Vec<f64>> {
        let n = self.signal.len();
        let mut out = Vec::with_capacity(self.events.len());
        for (index, m) in self.events.markers().iter().enumerate() {
            if m.finish >= n {
                return Err(Error::Fragment {
                    index,
                    start: m.start,
                    finish: m.finish,
                    reason: format!("ends past the recording ({n} samples)"),
                });
            }
            out.push(stats::rms(&self.signal[m.start..=m.finish]));
        }
        for (m, &r) in self.events.markers_mut().iter_mut().zip(&out) {
            m.rms = Some(r);
        }
        Ok(out)
    }
}
