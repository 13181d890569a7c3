//! # vigilance: hypnogram statistics and epoch-blocked EEG/EMG spectra
//!
//! `vigilance` analyses a single-channel EEG/EMG recording that has been
//! scored into fixed-length epochs (one vigilance state per epoch) and
//! annotated with tagged event markers.  It answers two kinds of question:
//!
//! * **Sleep architecture**: time spent in each state, episode structure
//!   and state transitions, per block of epochs.
//! * **Spectral content**: Welch power spectra per epoch, aggregated by
//!   state and time bin, optionally normalised, with artifact epochs blanked.
//!
//! ## Data flow
//!
//! ```text
//! signal.safetensors      scoring.json (hypnogram + markers)
//!   │                        │
//!   ├─ welch                 ├─ hypnogram      epochs, episodes, transitions
//!   │   per-epoch PSD         │                 per state × block
//!   │   (lazy, cached)        └─ events         tags, TOI timing, histograms,
//!   │                                            exclusion mask
//!   └──────────────┬──────────┘
//!                  └─ recording   masked spectra → normalize (7 power modes,
//!                                 4 band modes), marker spectra, marker RMS
//! ```
//!
//! ## Quick start
//!
//! ```no_run
//! use vigilance::{AnalysisConfig, PowerMode, Recording};
//! use vigilance::io::{ScoringFile, SignalData};
//! use std::path::Path;
//!
//! let sig = SignalData::load(Path::new("data/eeg.safetensors")).unwrap();
//! let scoring = ScoringFile::load(Path::new("data/scoring.json")).unwrap();
//!
//! let cfg = AnalysisConfig { epoch_sec: 4.0, block: 900, ..AnalysisConfig::default() };
//! let rec = Recording::new(sig.signal, sig.srate, scoring.hypnogram, scoring.markers, cfg).unwrap();
//!
//! // Hourly, state-normalised spectra (percent of each state's total power).
//! let table = rec.power(PowerMode::StateNormBinned).unwrap();
//! println!("{:?}", table.values.dim()); // [n_freqs, n_states, n_bins]
//! ```
//!
//! ## Running individual engines
//!
//! The engines are usable without a [`Recording`]:
//!
//! ```no_run
//! use vigilance::{HypnogramAnalyzer, SpectralEstimator, SpectralParams};
//! use std::sync::Arc;
//!
//! let hyp = HypnogramAnalyzer::new(vec![1, 1, 2, 2, 3, 1], 3, 3, 4.0).unwrap();
//! let counts = hyp.state_epoch_counts(); // [3 states, 2 blocks]
//!
//! let signal: Arc<[f64]> = vec![0.0; 256 * 40].into();
//! let est = SpectralEstimator::new(signal, 256.0, SpectralParams::default()).unwrap();
//! let spectra = est.spectra(None).unwrap(); // [n_foi, 10 epochs]
//! ```

pub mod config;
pub mod epoch;
pub mod error;
pub mod events;
pub mod hypnogram;
pub mod io;
pub mod normalize;
pub mod recording;
pub mod stats;
pub mod welch;
pub mod window;

// ── Crate-root re-exports ─────────────────────────────────────────────────
//
// Everything a downstream user is likely to need is available directly as
// `vigilance::Foo` without having to know the internal module layout.

// config
pub use config::{AnalysisConfig, Band, Bands, FragmentPolicy, State, MAX_STATES};

// error
pub use error::{Error, Result};

// events
pub use events::{EventRegistry, EventStates, Marker, TagFilter};

// hypnogram
pub use hypnogram::{
    decode_transition, labels_from_raw, transition_code,
    Episode, HypnogramAnalyzer, TransitionTable,
};

// normalize: power and band-power aggregation modes
pub use normalize::{BandMode, PowerMode, PowerTable};

// recording
pub use recording::{HypnogramStats, MarkerSpectra, Recording};

// welch
pub use welch::{welch_psd, LogSpectra, SpectralEstimator, SpectralParams};

// window
pub use window::WindowKind;
