mod common;
use approx::assert_abs_diff_eq;
use common::{argmax, config, tone_recording, SRATE};
use vigilance::{
    Band, BandMode, Error, FragmentPolicy, Marker, PowerMode, Recording, TagFilter, WindowKind,
};

// Twelve 4 s epochs, every state four times, two 6-epoch bins.
const LABELS: [u8; 12] = [1, 1, 2, 2, 3, 3, 1, 2, 3, 1, 2, 3];
const SPE: usize = 512;

fn rec(markers: Vec<Marker>) -> Recording {
    tone_recording(&LABELS, markers, 6)
}

#[test]
fn raw_power_peaks_at_each_state_tone() {
    let r = rec(vec![]);
    let t = r.power(PowerMode::Raw).unwrap();
    assert_eq!(t.values.dim(), (41, 3, 1));
    for (s, hz) in [(0, 6.0), (1, 2.0), (2, 10.0)] {
        let k = argmax(t.values.slice(ndarray::s![.., s, 0]).iter().copied());
        assert_abs_diff_eq!(t.freqs[k], hz, epsilon = 1e-9);
    }
    assert!(t.empty_groups.is_empty());
}

#[test]
fn state_normalised_spectra_sum_to_100() {
    let r = rec(vec![]);
    for mode in [PowerMode::StateNorm, PowerMode::StateNormBinned, PowerMode::StateTotalBinned] {
        let t = r.power(mode).unwrap();
        for s in 0..3 {
            for b in 0..t.values.dim().2 {
                let sum: f64 = t.values.slice(ndarray::s![.., s, b]).sum();
                assert_abs_diff_eq!(sum, 100.0, epsilon = 1e-6);
            }
        }
    }
}

#[test]
fn total_normalised_spectra_average_to_100() {
    // Equal epoch counts per state: the state means average to the grand mean.
    let r = rec(vec![]);
    let t = r.power(PowerMode::TotalNorm).unwrap();
    assert_abs_diff_eq!(t.values.sum(), 300.0, epsilon = 1e-6);
    let tb = r.power(PowerMode::TotalNormBinned).unwrap();
    assert_eq!(tb.values.dim(), (41, 3, 2));
    for b in 0..2 {
        assert_abs_diff_eq!(tb.values.slice(ndarray::s![.., .., b]).sum(), 300.0, epsilon = 1e-6);
    }
}

#[test]
fn every_keyword_set_resolves() {
    let r = rec(vec![]);
    for mode in PowerMode::ALL_MODES {
        let t = r.power_by_keywords(mode.keywords()).unwrap();
        assert_eq!(t.mode, mode);
        let bins = if mode.is_binned() { 2 } else { 1 };
        assert_eq!(t.values.dim(), (41, 3, bins));
    }
    assert!(matches!(r.power_by_keywords(&["bin", "fancy"]), Err(Error::UnknownMode(_))));
}

#[test]
fn excluded_epochs_are_blanked() {
    // Art over epochs 4 and 5: both REM epochs of the first bin.
    let r = rec(vec![Marker::new(4 * SPE + 3, 6 * SPE - 1, "Art")]);
    let mask = r.exclusion_mask();
    assert_eq!(mask.iter().filter(|&&x| x).count(), 2);
    assert!(mask[4] && mask[5]);

    let p = r.masked_spectra().unwrap();
    assert!(p.column(4).iter().all(|v| v.is_nan()));
    assert!(p.column(3).iter().all(|v| v.is_finite()));

    let t = r.power(PowerMode::RawBinned).unwrap();
    assert!(t.values.slice(ndarray::s![.., 2, 0]).iter().all(|v| v.is_nan()));
    assert!(t.values.slice(ndarray::s![.., 2, 1]).iter().all(|v| v.is_finite()));
    assert_eq!(t.empty_groups, vec![(3, 0)]);

    // Unbinned REM survives on the second-bin epochs.
    let raw = r.power(PowerMode::Raw).unwrap();
    assert!(raw.values.slice(ndarray::s![.., 2, 0]).iter().all(|v| v.is_finite()));
}

#[test]
fn clearing_excluded_tags_restores_epochs() {
    let mut r = rec(vec![Marker::new(4 * SPE, 4 * SPE + 10, "Art")]);
    assert!(r.exclusion_mask()[4]);
    r.set_excluded_tags(vec![]).unwrap();
    assert!(r.exclusion_mask().iter().all(|&x| !x));
    assert!(r.masked_spectra().unwrap().iter().all(|v| v.is_finite()));
}

#[test]
fn band_table_by_state() {
    let r = rec(vec![]);
    let delta = r.band_power_table(Band::Delta, BandMode::ByState).unwrap();
    assert_eq!(delta.dim(), (3, 1));
    assert!(delta[[1, 0]] > delta[[0, 0]]);
    assert!(delta[[1, 0]] > delta[[2, 0]]);

    let theta = r.band_power_table(Band::Theta, BandMode::ByStateBinned).unwrap();
    assert_eq!(theta.dim(), (3, 2));
    assert!(theta[[0, 1]] > theta[[2, 1]]);

    let total = r.band_power_table(Band::All, BandMode::Total).unwrap();
    assert_eq!(total.dim(), (1, 1));
    let binned = r.band_power_table(Band::All, BandMode::Binned).unwrap();
    assert_abs_diff_eq!((binned[[0, 0]] + binned[[0, 1]]) / 2.0, total[[0, 0]], epsilon = 1e-12);
}

#[test]
fn marker_spectrum_extends_to_whole_kernels() {
    // 200 samples inside a REM epoch → padded to 256 (two 128-sample kernels).
    let start = 4 * SPE + 50;
    let r = rec(vec![Marker::new(start, start + 199, "SWD")]);
    let ms = r.marker_spectra().unwrap();
    assert_eq!(ms.markers, vec![0]);
    assert_eq!(ms.fragments, vec![start..start + 256]);
    let k = argmax(ms.values.column(0).iter().copied());
    assert_abs_diff_eq!(ms.freqs[k], 10.0, epsilon = 1e-9);
}

#[test]
fn marker_fragment_policies() {
    let start = 4 * SPE + 50;
    let markers = vec![Marker::new(start, start + 199, "SWD")];

    let signal = common::state_tones(&LABELS, &[6.0, 2.0, 10.0], SRATE, 4.0);
    let truncate = vigilance::AnalysisConfig { fragment_policy: FragmentPolicy::Truncate, ..config(6) };
    let r = Recording::new(signal.clone(), SRATE, LABELS.to_vec(), markers.clone(), truncate).unwrap();
    assert_eq!(r.fragment_range(0).unwrap(), start..start + 128);

    let strict = vigilance::AnalysisConfig { fragment_policy: FragmentPolicy::Error, ..config(6) };
    let r = Recording::new(signal, SRATE, LABELS.to_vec(), markers, strict).unwrap();
    assert!(matches!(r.marker_spectra(), Err(Error::Fragment { index: 0, .. })));
}

#[test]
fn extension_at_recording_end_falls_back_to_available_kernels() {
    let n = LABELS.len() * SPE;
    let r = rec(vec![Marker::new(n - 150, n - 1, "SWD")]);
    assert_eq!(r.fragment_range(0).unwrap(), n - 150..n - 150 + 128);

    let r = rec(vec![Marker::new(n - 100, n - 1, "SWD")]);
    assert!(matches!(r.fragment_range(0), Err(Error::Fragment { .. })));
}

#[test]
fn marker_spectra_follow_toi() {
    let mut r = rec(vec![
        Marker::new(0, 255, "SWD"),
        Marker::new(2 * SPE, 2 * SPE + 255, "Spindle"),
    ]);
    assert_eq!(r.marker_spectra().unwrap().values.ncols(), 2);
    r.set_toi(TagFilter::tag("Spindle"));
    let ms = r.marker_spectra().unwrap();
    assert_eq!(ms.markers, vec![1]);
    let k = argmax(ms.values.column(0).iter().copied());
    assert_abs_diff_eq!(ms.freqs[k], 2.0, epsilon = 1e-9);
}

#[test]
fn marker_rms_of_whole_cycle_sine() {
    let mut r = rec(vec![Marker::new(0, SPE - 1, "SWD")]);
    let rms = r.marker_rms().unwrap();
    assert_abs_diff_eq!(rms[0], 0.5_f64.sqrt(), epsilon = 1e-9);
    assert_eq!(r.markers()[0].rms, Some(rms[0]));
}

#[test]
fn reads_are_idempotent() {
    let r = rec(vec![Marker::new(4 * SPE, 4 * SPE + 10, "Art")]);
    for mode in PowerMode::ALL_MODES {
        let a = r.power(mode).unwrap();
        let b = r.power(mode).unwrap();
        assert!(a.values.iter().zip(b.values.iter()).all(|(x, y)| x.to_bits() == y.to_bits()));
    }
    let s = r.hypnogram_stats();
    assert_eq!(s.epoch_counts, r.hypnogram_stats().epoch_counts);
    assert_eq!(s.transitions, r.hypnogram_stats().transitions);
}

#[test]
fn spectral_mutation_marks_cache_dirty() {
    let mut r = rec(vec![]);
    let before = r.power(PowerMode::Raw).unwrap();
    assert!(!r.spectral().is_dirty());

    r.set_excluded_tags(vec!["SWD".into()]).unwrap();
    assert!(!r.spectral().is_dirty(), "non-spectral change keeps the cache");

    r.set_window(WindowKind::Blackman).unwrap();
    assert!(r.spectral().is_dirty());
    let after = r.power(PowerMode::Raw).unwrap();
    assert_ne!(before.values, after.values);
}

#[test]
fn block_and_length_mismatch_trim_usable_epochs() {
    let mut r = rec(vec![]);
    assert_eq!(r.n_used_epochs(), 12);
    assert_eq!(r.bin_epochs(), 6);
    r.set_block(5).unwrap();
    assert_eq!(r.n_used_epochs(), 10);
    assert_eq!(r.hypnogram().nblocks(), 2);

    // A hypnogram longer than the signal is cut to the signal.
    r.set_block(0).unwrap();
    let mut longer = LABELS.to_vec();
    longer.extend([1, 2, 3]);
    r.set_hypnogram(longer).unwrap();
    assert_eq!(r.n_used_epochs(), 12);
    assert_eq!(r.power(PowerMode::Raw).unwrap().values.dim(), (41, 3, 1));
}

#[test]
fn failed_mutation_is_atomic() {
    let mut r = rec(vec![]);
    let cfg = r.config().clone();
    assert!(r.set_kernel_overlap(1.0).is_err());
    assert!(r.set_freq_range(30.0, 10.0).is_err());
    assert!(r.set_epoch_sec(0.5).is_err()); // kernel of 1 s no longer fits
    assert!(matches!(r.set_hypnogram(vec![1, 4, 2]), Err(Error::LabelOutOfRange { .. })));
    assert_eq!(r.config(), &cfg);
    assert_eq!(r.hypnogram().labels(), &LABELS);
}

#[test]
fn event_states_use_recording_epochs() {
    // SWD 0.5 s into epoch 2, which follows a 1 → 2 change: flagged.
    let r = rec(vec![Marker::new(2 * SPE + 64, 2 * SPE + 200, "SWD")]);
    let es = r.event_states().unwrap();
    assert_eq!(es.epochs, vec![Some(2)]);
    assert_eq!(es.states, vec![Some(2)]);
    assert_eq!(es.double_check, vec![0]);
    assert_eq!(r.events_per_epoch().unwrap(), vec![0, 0, 1]);
}

#[test]
fn frequency_range_change_resizes_tables() {
    let mut r = rec(vec![]);
    r.set_freq_range(1.0, 20.0).unwrap();
    let t = r.power(PowerMode::Raw).unwrap();
    assert_eq!(t.freqs.len(), 20);
    assert_eq!(t.values.dim(), (20, 3, 1));
}

#[test]
fn event_histogram_uses_configured_bin_width() {
    // 24 s bins over starts at 0 s and 44 s.
    let signal = common::state_tones(&LABELS, &[6.0, 2.0, 10.0], SRATE, 4.0);
    let cfg = vigilance::AnalysisConfig { bin_hours: 24.0 / 3600.0, ..config(6) };
    let markers = vec![Marker::new(0, 100, "SWD"), Marker::new(11 * SPE, 11 * SPE + 100, "SWD")];
    let r = Recording::new(signal, SRATE, LABELS.to_vec(), markers, cfg).unwrap();
    assert_eq!(r.events_per_bin().unwrap(), vec![1, 1]);
}
