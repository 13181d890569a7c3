//! Window functions for Welch segments.
//!
//! All windows are the symmetric variants (`w[0] == w[n-1]`).
use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Window applied to every Welch segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WindowKind {
    #[default]
    Hann,
    Hamming,
    Blackman,
    BlackmanHarris,
    /// Kaiser window; the shape parameter β lives in the spectral parameters.
    Kaiser,
}

impl WindowKind {
    /// Coefficients of length `n`.  `beta` is only read for [`WindowKind::Kaiser`].
    pub fn coefficients(self, n: usize, beta: f64) -> Vec<f64> {
        if n == 0 {
            return Vec::new();
        }
        if n == 1 {
            return vec![1.0];
        }
        let m = (n - 1) as f64;
        match self {
            Self::Hann => cosine_sum(n, &[0.5, 0.5]),
            Self::Hamming => cosine_sum(n, &[0.54, 0.46]),
            Self::Blackman => cosine_sum(n, &[0.42, 0.5, 0.08]),
            Self::BlackmanHarris => cosine_sum(n, &[0.35875, 0.48829, 0.14128, 0.01168]),
            Self::Kaiser => {
                let denom = bessel_i0(beta);
                (0..n)
                    .map(|i| {
                        let r = 2.0 * i as f64 / m - 1.0;
                        bessel_i0(beta * (1.0 - r * r).max(0.0).sqrt()) / denom
                    })
                    .collect()
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hann => "hann",
            Self::Hamming => "hamming",
            Self::Blackman => "blackman",
            Self::BlackmanHarris => "blackman-harris",
            Self::Kaiser => "kaiser",
        }
    }
}

impl FromStr for WindowKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "hann" | "hanning" => Ok(Self::Hann),
            "hamming" => Ok(Self::Hamming),
            "blackman" => Ok(Self::Blackman),
            "blackman-harris" | "blackmanharris" => Ok(Self::BlackmanHarris),
            "kaiser" => Ok(Self::Kaiser),
            _ => Err(Error::UnknownWindow(s.to_string())),
        }
    }
}

impl fmt::Display for WindowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Generalised cosine-sum window: `Σ_k (-1)^k a_k cos(2πk i / (n-1))`.
fn cosine_sum(n: usize, a: &[f64]) -> Vec<f64> {
    let m = (n - 1) as f64;
    (0..n)
        .map(|i| {
            let x = 2.0 * PI * i as f64 / m;
            a.iter()
                .enumerate()
                .map(|(k, &ak)| {
                    let sign = if k % 2 == 0 { 1.0 } else { -1.0 };
                    sign * ak * (k as f64 * x).cos()
                })
                .sum()
        })
        .collect()
}

/// Zeroth-order modified Bessel function of the first kind (power series).
fn bessel_i0(x: f64) -> f64 {
    let half = x / 2.0;
    let mut term = 1.0;
    let mut sum = 1.0;
    for k in 1..64 {
        term *= (half / k as f64).powi(2);
        sum += term;
        if term < sum * 1e-17 {
            break;
        }
    }
    sum
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [WindowKind; 5] = [
        WindowKind::Hann,
        WindowKind::Hamming,
        WindowKind::Blackman,
        WindowKind::BlackmanHarris,
        WindowKind::Kaiser,
    ];

    #[test]
    fn windows_are_symmetric() {
        for kind in ALL {
            let w = kind.coefficients(101, 0.5);
            for i in 0..50 {
                approx::assert_abs_diff_eq!(w[i], w[100 - i], epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn hann_endpoints_zero_peak_one() {
        let w = WindowKind::Hann.coefficients(9, 0.0);
        approx::assert_abs_diff_eq!(w[0], 0.0, epsilon = 1e-12);
        approx::assert_abs_diff_eq!(w[4], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn hamming_matches_closed_form() {
        let n = 64;
        let w = WindowKind::Hamming.coefficients(n, 0.0);
        for (i, &v) in w.iter().enumerate() {
            let exp = 0.54 - 0.46 * (2.0 * PI * i as f64 / (n - 1) as f64).cos();
            approx::assert_abs_diff_eq!(v, exp, epsilon = 1e-12);
        }
    }

    #[test]
    fn kaiser_beta_zero_is_rectangular() {
        let w = WindowKind::Kaiser.coefficients(16, 0.0);
        for &v in &w {
            approx::assert_abs_diff_eq!(v, 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn bessel_i0_known_values() {
        approx::assert_abs_diff_eq!(bessel_i0(0.0), 1.0, epsilon = 1e-15);
        approx::assert_abs_diff_eq!(bessel_i0(1.0), 1.266_065_877_752_008_4, epsilon = 1e-12);
    }

    #[test]
    fn parse_names() {
        assert_eq!("Blackman-Harris".parse::<WindowKind>().unwrap(), WindowKind::BlackmanHarris);
        assert_eq!("hanning".parse::<WindowKind>().unwrap(), WindowKind::Hann);
        assert!(matches!("tukey".parse::<WindowKind>(), Err(Error::UnknownWindow(_))));
    }
}
