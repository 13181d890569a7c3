//! Epoch-wise Welch power spectral density.
//!
//! The signal is cut into epochs of `epoch_sec` seconds (`epoch_sec == 0`
//! treats the whole input as one epoch).  Each epoch gets a one-sided Welch
//! estimate from overlapping windowed segments of `kernel_sec` seconds:
//!
//! ```text
//! nperseg = nfft = kernel_sec · srate
//! noverlap       = floor(nperseg · kernel_overlap)
//! n_segments     = floor((L − noverlap) / (nperseg − noverlap))
//! P[k]           = mean_seg |X_seg[k]|² / (srate · Σ w²)   (×2 except DC / Nyquist)
//! ```
//!
//! The grid resolution is `1 / kernel_sec` Hz whatever the sampling rate;
//! only the Nyquist ceiling depends on `srate`.
//!
//! Spectra are computed lazily and cached.  Any parameter change empties the
//! cache, and the next read recomputes it.
use std::cell::OnceCell;
use std::sync::Arc;

use log::{debug, warn};
use ndarray::{Array2, Axis};
use rustfft::{num_complex::Complex, FftPlanner};

use crate::config::AnalysisConfig;
use crate::epoch::{epoch_columns, seconds_to_samples};
use crate::error::{Error, Result};
use crate::stats::nanmean;
use crate::window::WindowKind;

/// Parameters of the epoch-wise Welch estimate.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectralParams {
    /// Seconds per analysis epoch; `0` means the whole input is one epoch.
    pub epoch_sec: f64,
    /// Welch segment length in seconds (≤ `epoch_sec` unless that is `0`).
    pub kernel_sec: f64,
    /// Segment overlap fraction in `[0, 1)`.
    pub kernel_overlap: f64,
    pub window: WindowKind,
    pub kaiser_beta: f64,
    /// Frequency-of-interest window in Hz.
    pub hz_min: f64,
    pub hz_max: f64,
}

impl SpectralParams {
    pub fn from_config(cfg: &AnalysisConfig) -> Self {
        Self {
            epoch_sec: cfg.epoch_sec,
            kernel_sec: cfg.kernel_sec,
            kernel_overlap: cfg.kernel_overlap,
            window: cfg.window,
            kaiser_beta: cfg.kaiser_beta,
            hz_min: cfg.hz_min,
            hz_max: cfg.hz_max,
        }
    }
}

impl Default for SpectralParams {
    fn default() -> Self {
        Self::from_config(&AnalysisConfig::default())
    }
}

/// Log-scaled spectra plus the finite min/max seen, for plot scaling.
#[derive(Debug, Clone)]
pub struct LogSpectra {
    pub values: Array2<f64>,
    pub min: f64,
    pub max: f64,
}

/// Sample-domain layout derived from [`SpectralParams`] and the input length.
#[derive(Debug, Clone, PartialEq)]
struct Layout {
    samples_per_epoch: usize,
    n_epochs: usize,
    nperseg: usize,
    noverlap: usize,
    freqs: Vec<f64>,
    foi: Vec<usize>,
}

impl Layout {
    fn derive(n_samples: usize, srate: f64, p: &SpectralParams) -> Result<Self> {
        if !(srate > 0.0) || !srate.is_finite() {
            return Err(Error::param("srate", format!("must be > 0, got {srate}")));
        }
        if !(p.epoch_sec >= 0.0) {
            return Err(Error::param("epoch_sec", format!("must be >= 0, got {}", p.epoch_sec)));
        }
        if !(p.kernel_sec > 0.0) {
            return Err(Error::param("kernel_sec", format!("must be > 0, got {}", p.kernel_sec)));
        }
        if p.epoch_sec > 0.0 && p.kernel_sec > p.epoch_sec {
            return Err(Error::param(
                "kernel_sec",
                format!("{} s exceeds epoch_sec = {} s", p.kernel_sec, p.epoch_sec),
            ));
        }
        if !(0.0..1.0).contains(&p.kernel_overlap) {
            return Err(Error::param(
                "kernel_overlap",
                format!("must be in [0, 1), got {}", p.kernel_overlap),
            ));
        }
        if !(p.hz_min >= 0.0) || !(p.hz_min <= p.hz_max) {
            return Err(Error::param(
                "hz_min",
                format!("need 0 <= hz_min <= hz_max, got [{}, {}]", p.hz_min, p.hz_max),
            ));
        }
        if p.window == WindowKind::Kaiser && !(p.kaiser_beta >= 0.0) {
            return Err(Error::param("kaiser_beta", "must be >= 0"));
        }

        let nperseg = seconds_to_samples("kernel_sec", p.kernel_sec, srate)?;
        if nperseg < 2 {
            return Err(Error::param("kernel_sec", "kernel must span at least 2 samples"));
        }
        let samples_per_epoch = if p.epoch_sec == 0.0 {
            if n_samples < nperseg {
                return Err(Error::param(
                    "signal",
                    format!("{n_samples} samples is shorter than one kernel ({nperseg})"),
                ));
            }
            n_samples
        } else {
            seconds_to_samples("epoch_sec", p.epoch_sec, srate)?
        };
        let n_epochs = n_samples / samples_per_epoch;
        let noverlap = (nperseg as f64 * p.kernel_overlap).floor() as usize;

        let freqs: Vec<f64> = (0..=nperseg / 2).map(|k| k as f64 * srate / nperseg as f64).collect();
        let foi = freqs
            .iter()
            .enumerate()
            .filter(|(_, &f)| f >= p.hz_min && f <= p.hz_max)
            .map(|(i, _)| i)
            .collect();

        Ok(Self { samples_per_epoch, n_epochs, nperseg, noverlap, freqs, foi })
    }
}

/// Per-epoch Welch spectra over a shared signal.
pub struct SpectralEstimator {
    signal: Arc<[f64]>,
    srate: f64,
    params: SpectralParams,
    layout: Layout,
    /// Full-grid spectra `[n_freqs, n_epochs]`; empty means dirty.
    cache: OnceCell<Array2<f64>>,
}

impl SpectralEstimator {
    pub fn new(signal: Arc<[f64]>, srate: f64, params: SpectralParams) -> Result<Self> {
        let layout = Layout::derive(signal.len(), srate, &params)?;
        Ok(Self { signal, srate, params, layout, cache: OnceCell::new() })
    }

    /// Replace the parameters.  The cached spectra are dropped when anything
    /// changed; invalid parameters leave the estimator untouched.
    pub fn set_params(&mut self, params: SpectralParams) -> Result<()> {
        if params == self.params {
            return Ok(());
        }
        self.layout = Layout::derive(self.signal.len(), self.srate, &params)?;
        self.params = params;
        self.cache = OnceCell::new();
        Ok(())
    }

    pub fn params(&self) -> &SpectralParams {
        &self.params
    }

    pub fn srate(&self) -> f64 {
        self.srate
    }

    pub fn is_dirty(&self) -> bool {
        self.cache.get().is_none()
    }

    pub fn n_epochs(&self) -> usize {
        self.layout.n_epochs
    }

    pub fn samples_per_epoch(&self) -> usize {
        self.layout.samples_per_epoch
    }

    /// Samples per Welch segment.
    pub fn kernel_samples(&self) -> usize {
        self.layout.nperseg
    }

    /// Full one-sided frequency grid, `0 ..= srate/2` in `1/kernel_sec` steps.
    pub fn frequencies(&self) -> &[f64] {
        &self.layout.freqs
    }

    /// Grid indices inside `[hz_min, hz_max]`.
    pub fn foi_indices(&self) -> &[usize] {
        &self.layout.foi
    }

    pub fn foi_frequencies(&self) -> Vec<f64> {
        self.layout.foi.iter().map(|&i| self.layout.freqs[i]).collect()
    }

    /// Full-grid spectra `[n_freqs, n_epochs]`, computed on first access.
    pub fn full_spectra(&self) -> &Array2<f64> {
        self.cache.get_or_init(|| self.compute())
    }

    /// FOI spectra `[n_foi, selected]` for the given epochs (all when `None`).
    pub fn spectra(&self, epochs: Option<&[usize]>) -> Result<Array2<f64>> {
        let full = self.full_spectra();
        let cols = match epochs {
            Some(idx) => {
                self.check_epochs(idx)?;
                full.select(Axis(1), idx)
            }
            None => full.clone(),
        };
        Ok(cols.select(Axis(0), &self.layout.foi))
    }

    /// Base-10 log of [`spectra`](Self::spectra) with the finite min/max.
    pub fn log_spectra(&self, epochs: Option<&[usize]>) -> Result<LogSpectra> {
        let values = self.spectra(epochs)?.mapv(f64::log10);
        let (min, max) = values
            .iter()
            .filter(|v| v.is_finite())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        Ok(LogSpectra { values, min, max })
    }

    /// Per-epoch mean power over grid points in `[lo, hi]` Hz.
    ///
    /// The band is taken on the full grid, independent of the FOI window.
    /// A band containing no grid point yields NaN for every epoch.
    pub fn band_power(&self, range: [f64; 2]) -> Vec<f64> {
        let [lo, hi] = range;
        let rows: Vec<usize> = self
            .layout
            .freqs
            .iter()
            .enumerate()
            .filter(|(_, &f)| f >= lo && f <= hi)
            .map(|(i, _)| i)
            .collect();
        if rows.is_empty() {
            warn!("band [{lo}, {hi}] Hz holds no frequency bin at {} Hz resolution", 1.0 / self.params.kernel_sec);
            return vec![f64::NAN; self.layout.n_epochs];
        }
        let full = self.full_spectra();
        full.columns()
            .into_iter()
            .map(|col| rows.iter().map(|&r| col[r]).sum::<f64>() / rows.len() as f64)
            .collect()
    }

    /// NaN-aware mean FOI spectrum over the given epochs.
    pub fn mean_power(&self, epochs: Option<&[usize]>) -> Result<Vec<f64>> {
        let s = self.spectra(epochs)?;
        Ok(s.rows().into_iter().map(|row| nanmean(row.iter().copied())).collect())
    }

    /// `(frequencies, power)` of one epoch over the FOI window.
    pub fn power_density_curve(&self, epoch: usize) -> Result<(Vec<f64>, Vec<f64>)> {
        let s = self.spectra(Some(&[epoch]))?;
        Ok((self.foi_frequencies(), s.column(0).to_vec()))
    }

    /// Log-power spectrogram `[n_foi, n_epochs]` for display.
    pub fn spectrogram(&self) -> Array2<f64> {
        self.full_spectra()
            .select(Axis(0), &self.layout.foi)
            .mapv(f64::log10)
    }

    fn check_epochs(&self, idx: &[usize]) -> Result<()> {
        match idx.iter().find(|&&e| e >= self.layout.n_epochs) {
            Some(&index) => Err(Error::EpochOutOfRange { index, n_epochs: self.layout.n_epochs }),
            None => Ok(()),
        }
    }

    fn compute(&self) -> Array2<f64> {
        let l = &self.layout;
        debug!(
            "welch: {} epochs × {} samples, kernel {} samples, overlap {}, {} window",
            l.n_epochs, l.samples_per_epoch, l.nperseg, l.noverlap, self.params.window
        );
        let window = self.params.window.coefficients(l.nperseg, self.params.kaiser_beta);
        let mut out = Array2::<f64>::zeros((l.freqs.len(), l.n_epochs));
        let mut planner: FftPlanner<f64> = FftPlanner::new();
        let fft = planner.plan_fft_forward(l.nperseg);
        let epochs = epoch_columns(&self.signal, l.samples_per_epoch);
        for (e, x) in epochs.columns().into_iter().enumerate() {
            let psd = welch_with(&x.to_vec(), self.srate, l.noverlap, &window, fft.as_ref());
            out.column_mut(e).assign(&ndarray::ArrayView1::from(&psd));
        }
        out
    }
}

/// One-sided Welch PSD of `x` with the given window (its length is `nperseg`).
///
/// `x` must hold at least one full segment.
pub fn welch_psd(x: &[f64], srate: f64, noverlap: usize, window: &[f64]) -> Vec<f64> {
    let mut planner: FftPlanner<f64> = FftPlanner::new();
    let fft = planner.plan_fft_forward(window.len());
    welch_with(x, srate, noverlap, window, fft.as_ref())
}

fn welch_with(
    x: &[f64],
    srate: f64,
    noverlap: usize,
    window: &[f64],
    fft: &dyn rustfft::Fft<f64>,
) -> Vec<f64> {
    let nperseg = window.len();
    let hop = nperseg - noverlap;
    let n_seg = if x.len() < nperseg { 0 } else { (x.len() - noverlap) / hop };
    let n_freq = nperseg / 2 + 1;
    let mut acc = vec![0.0_f64; n_freq];
    if n_seg == 0 {
        return vec![f64::NAN; n_freq];
    }

    let mut buf = vec![Complex::<f64>::default(); nperseg];
    for seg in 0..n_seg {
        let start = seg * hop;
        for (b, (&v, &w)) in buf.iter_mut().zip(x[start..start + nperseg].iter().zip(window)) {
            *b = Complex { re: v * w, im: 0.0 };
        }
        fft.process(&mut buf);
        for (a, c) in acc.iter_mut().zip(buf.iter()) {
            *a += c.norm_sqr();
        }
    }

    let win_s2: f64 = window.iter().map(|w| w * w).sum();
    let scale = 1.0 / (n_seg as f64 * srate * win_s2);
    let nyquist = if nperseg % 2 == 0 { Some(nperseg / 2) } else { None };
    for (k, a) in acc.iter_mut().enumerate() {
        *a *= scale;
        if k != 0 && Some(k) != nyquist {
            *a *= 2.0;
        }
    }
    acc
}
