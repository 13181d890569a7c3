/// Shared helpers for synthetic recordings.
use std::f64::consts::PI;
use vigilance::{AnalysisConfig, Marker, Recording};

#[allow(unused)]
/// `amp · sin(2π f t)` sampled at `srate` for `seconds`.
pub fn sine(freq: f64, srate: f64, seconds: f64, amp: f64) -> Vec<f64> {
    let n = (srate * seconds).round() as usize;
    (0..n)
        .map(|i| amp * (2.0 * PI * freq * i as f64 / srate).sin())
        .collect()
}

#[allow(unused)]
/// One tone per epoch, picked by the epoch's state: state `s` → `tones[s-1]` Hz.
pub fn state_tones(labels: &[u8], tones: &[f64], srate: f64, epoch_sec: f64) -> Vec<f64> {
    let spe = (srate * epoch_sec).round() as usize;
    let mut out = Vec::with_capacity(labels.len() * spe);
    for &l in labels {
        let f = tones[l as usize - 1];
        out.extend((0..spe).map(|i| (2.0 * PI * f * i as f64 / srate).sin()));
    }
    out
}

#[allow(unused)]
/// Test configuration: 4 s epochs, 1 s kernels, 0.5–40 Hz, given block.
pub fn config(block: usize) -> AnalysisConfig {
    AnalysisConfig {
        epoch_sec: 4.0,
        kernel_sec: 1.0,
        hz_min: 0.0,
        hz_max: 40.0,
        block,
        ..AnalysisConfig::default()
    }
}

#[allow(unused)]
pub const SRATE: f64 = 128.0;

#[allow(unused)]
/// Three-state recording where Wake carries 6 Hz, NREM 2 Hz and REM 10 Hz.
pub fn tone_recording(labels: &[u8], markers: Vec<Marker>, block: usize) -> Recording {
    let signal = state_tones(labels, &[6.0, 2.0, 10.0], SRATE, 4.0);
    Recording::new(signal, SRATE, labels.to_vec(), markers, config(block))
        .expect("valid synthetic recording")
}

#[allow(unused)]
/// Index of the largest finite value.
pub fn argmax(xs: impl IntoIterator<Item = f64>) -> usize {
    xs.into_iter()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .fold((0, f64::MIN), |(bi, bv), (i, v)| if v > bv { (i, v) } else { (bi, bv) })
        .0
}
