//! Epoch and block arithmetic.
//!
//! A continuous 1-D signal is cut into non-overlapping epochs of
//! `samples_per_epoch` samples, dropping any trailing incomplete epoch.
//! Epoch sequences are in turn grouped into blocks of `block` epochs,
//! dropping any trailing incomplete block.
use ndarray::{s, Array2};

use crate::error::{Error, Result};

/// Convert a duration to a whole number of samples.
///
/// `seconds * srate` must be integral to within 1e-6 samples.
pub fn seconds_to_samples(name: &'static str, seconds: f64, srate: f64) -> Result<usize> {
    let exact = seconds * srate;
    let rounded = exact.round();
    if !exact.is_finite() || exact < 0.0 || (exact - rounded).abs() > 1e-6 {
        return Err(Error::param(
            name,
            format!("{seconds} s at {srate} Hz is not a whole number of samples"),
        ));
    }
    Ok(rounded as usize)
}

/// Reshape `signal` into a `[samples_per_epoch, n_epochs]` matrix, one epoch
/// per column.  Trailing samples that don't fill an epoch are discarded.
pub fn epoch_columns(signal: &[f64], samples_per_epoch: usize) -> Array2<f64> {
    let n_epochs = if samples_per_epoch == 0 { 0 } else { signal.len() / samples_per_epoch };
    let mut out = Array2::<f64>::zeros((samples_per_epoch, n_epochs));
    for e in 0..n_epochs {
        let start = e * samples_per_epoch;
        out.slice_mut(s![.., e])
            .assign(&ndarray::ArrayView1::from(&signal[start..start + samples_per_epoch]));
    }
    out
}

/// Epochs per block, with `0` meaning "everything is one block".
pub fn resolve_block(block: usize, len: usize) -> usize {
    if block == 0 { len } else { block }
}

/// Number of whole blocks in `len` epochs.
pub fn n_blocks(len: usize, block: usize) -> usize {
    let block = resolve_block(block, len);
    if block == 0 { 0 } else { len / block }
}

/// Largest multiple of `block` not exceeding `len`.
pub fn trim_to_blocks(len: usize, block: usize) -> usize {
    n_blocks(len, block) * resolve_block(block, len)
}

/// Reshape a per-epoch sequence into a `[block, nblocks]` matrix, one block
/// per column, after trimming to whole blocks.
pub fn block_matrix<T: Clone>(values: &[T], block: usize) -> Array2<T> {
    let block = resolve_block(block, values.len());
    let nb = n_blocks(values.len(), block);
    Array2::from_shape_fn((block, nb), |(i, j)| values[j * block + i].clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_count_and_shape() {
        let x = vec![1.0; 3840];
        let m = epoch_columns(&x, 1280);
        assert_eq!(m.dim(), (1280, 3));
    }

    #[test]
    fn trailing_samples_dropped() {
        let x: Vec<f64> = (0..1300).map(f64::from).collect();
        let m = epoch_columns(&x, 1280);
        assert_eq!(m.dim(), (1280, 1));
        assert_eq!(m[[1279, 0]], 1279.0);
    }

    #[test]
    fn columns_are_consecutive_epochs() {
        let x: Vec<f64> = (0..12).map(f64::from).collect();
        let m = epoch_columns(&x, 4);
        assert_eq!(m.column(2).to_vec(), vec![8.0, 9.0, 10.0, 11.0]);
    }

    #[test]
    fn block_trimming() {
        assert_eq!(n_blocks(13, 3), 4);
        assert_eq!(trim_to_blocks(13, 3), 12);
        assert_eq!(n_blocks(13, 0), 1);
        assert_eq!(trim_to_blocks(13, 0), 13);
        assert_eq!(n_blocks(0, 0), 0);
        assert_eq!(n_blocks(2, 3), 0);
    }

    #[test]
    fn block_matrix_layout() {
        let v = [1, 2, 3, 4, 5, 6, 7];
        let m = block_matrix(&v, 3);
        assert_eq!(m.dim(), (3, 2));
        assert_eq!(m.column(1).to_vec(), vec![4, 5, 6]);
    }

    #[test]
    fn samples_must_be_integral() {
        assert_eq!(seconds_to_samples("epoch_sec", 4.0, 400.0).unwrap(), 1600);
        assert_eq!(seconds_to_samples("kernel_sec", 0.5, 512.0).unwrap(), 256);
        assert!(seconds_to_samples("kernel_sec", 0.3, 333.0).is_err());
    }
}
