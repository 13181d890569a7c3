//! File formats used by the command-line driver.
//!
//! * Signal: a safetensors file holding a 1-D `signal` tensor (`F32` or
//!   `F64`) and a one-element `srate` tensor.
//! * Scoring: a JSON document `{ "hypnogram": [...], "markers": [...] }`.
//!   `null` hypnogram entries are unscored epochs and are rejected with
//!   their positions.
use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::events::Marker;
use crate::hypnogram::labels_from_raw;

// ── Low-level safetensors parser (raw bytes → f64, no tensor crate) ──────────

fn format_err(msg: impl Into<String>) -> Error {
    Error::Format(msg.into())
}

fn parse_header(bytes: &[u8]) -> Result<(HashMap<String, serde_json::Value>, usize)> {
    let Some(len) = bytes.get(..8) else {
        return Err(format_err("file too small for a safetensors header"));
    };
    let mut word = [0u8; 8];
    word.copy_from_slice(len);
    let n = u64::from_le_bytes(word);
    let end = usize::try_from(n)
        .ok()
        .and_then(|n| n.checked_add(8))
        .ok_or_else(|| format_err(format!("header length {n} overflows")))?;
    let body = bytes
        .get(8..end)
        .ok_or_else(|| format_err(format!("header length {n} runs past end of file")))?;
    let header: HashMap<String, serde_json::Value> = serde_json::from_slice(body)?;
    Ok((header, end))
}

fn read_tensor(bytes: &[u8], data_start: usize, name: &str, entry: &serde_json::Value) -> Result<Vec<f64>> {
    let offsets: Vec<usize> = entry["data_offsets"]
        .as_array()
        .map(|a| a.iter().filter_map(|v| v.as_u64()).map(|v| v as usize).collect())
        .unwrap_or_default();
    let &[s, e] = offsets.as_slice() else {
        return Err(format_err(format!("`{name}`: bad data_offsets")));
    };
    let (Some(lo), Some(hi)) = (data_start.checked_add(s), data_start.checked_add(e)) else {
        return Err(format_err(format!("`{name}`: data_offsets overflow")));
    };
    let raw = bytes
        .get(lo..hi)
        .ok_or_else(|| format_err(format!("`{name}`: data runs past end of file")))?;
    match entry["dtype"].as_str() {
        Some("F32") => Ok(raw
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64)
            .collect()),
        Some("F64") => Ok(raw
            .chunks_exact(8)
            .map(|b| f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
            .collect()),
        other => Err(format_err(format!("`{name}`: unsupported dtype {other:?}"))),
    }
}

// ── Signal ───────────────────────────────────────────────────────────────────

/// Single-channel recording loaded from safetensors.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalData {
    pub signal: Vec<f64>,
    /// Sampling rate (Hz).
    pub srate: f64,
}

impl SignalData {
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let (header, data_start) = parse_header(&bytes)?;

        let entry = header.get("signal").ok_or_else(|| format_err("missing 'signal' key"))?;
        let signal = read_tensor(&bytes, data_start, "signal", entry)?;

        let entry = header.get("srate").ok_or_else(|| format_err("missing 'srate' key"))?;
        let srate = match read_tensor(&bytes, data_start, "srate", entry)?.as_slice() {
            &[v] => v,
            other => return Err(format_err(format!("`srate` must hold one value, got {}", other.len()))),
        };
        Ok(Self { signal, srate })
    }

    /// Write as `F64` tensors, readable by [`load`](Self::load).
    pub fn save(&self, path: &Path) -> Result<()> {
        use std::io::Write;
        let tensors: [(&str, Vec<u8>); 2] = [
            ("signal", self.signal.iter().flat_map(|v| v.to_le_bytes()).collect()),
            ("srate", self.srate.to_le_bytes().to_vec()),
        ];
        let mut header_map = serde_json::Map::new();
        let mut offset: usize = 0;
        for (name, data) in &tensors {
            header_map.insert(name.to_string(), serde_json::json!({
                "dtype": "F64",
                "shape": [data.len() / 8],
                "data_offsets": [offset, offset + data.len()],
            }));
            offset += data.len();
        }
        let hdr_bytes = serde_json::to_vec(&header_map)?;
        let pad = (8 - hdr_bytes.len() % 8) % 8;
        let padded: Vec<u8> = hdr_bytes.into_iter().chain(std::iter::repeat(b' ').take(pad)).collect();
        let mut f = std::fs::File::create(path)?;
        f.write_all(&(padded.len() as u64).to_le_bytes())?;
        f.write_all(&padded)?;
        for (_, data) in &tensors {
            f.write_all(data)?;
        }
        Ok(())
    }
}

// ── Scoring ──────────────────────────────────────────────────────────────────

#[derive(Serialize, Deserialize)]
struct RawScoring {
    hypnogram: Vec<Option<f64>>,
    #[serde(default)]
    markers: Vec<Marker>,
}

/// Hypnogram and markers of one recording.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScoringFile {
    pub hypnogram: Vec<u8>,
    pub markers: Vec<Marker>,
}

impl ScoringFile {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let raw: RawScoring = serde_json::from_str(text)?;
        let values: Vec<f64> = raw.hypnogram.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect();
        Ok(Self { hypnogram: labels_from_raw(&values)?, markers: raw.markers })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let raw = RawScoring {
            hypnogram: self.hypnogram.iter().map(|&l| Some(l as f64)).collect(),
            markers: self.markers.clone(),
        };
        std::fs::write(path, serde_json::to_string_pretty(&raw)?)?;
        Ok(())
    }
}
