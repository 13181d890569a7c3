//! Tag-indexed event markers.
//!
//! A marker is a tagged interval `[start, finish]` in sample indices.  The
//! registry keeps the sorted, de-duplicated tag list in step with every tag
//! mutation and answers timing queries for the current tag-of-interest (TOI)
//! selection.
use std::collections::BTreeSet;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One tagged interval, in sample-index units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub start: usize,
    pub finish: usize,
    pub tag: String,
    /// Root mean square of the marked fragment, once computed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rms: Option<f64>,
}

impl Marker {
    pub fn new(start: usize, finish: usize, tag: impl Into<String>) -> Self {
        Self { start, finish, tag: tag.into(), rms: None }
    }
}

/// Which markers a query looks at.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TagFilter {
    /// Every marker.
    #[default]
    All,
    /// Markers whose tag is one of these.
    Tags(Vec<String>),
}

impl TagFilter {
    pub fn tag(tag: impl Into<String>) -> Self {
        Self::Tags(vec![tag.into()])
    }

    /// An empty tag list selects everything, like [`TagFilter::All`].
    pub fn tags<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tags: Vec<String> = tags.into_iter().map(Into::into).collect();
        if tags.is_empty() { Self::All } else { Self::Tags(tags) }
    }

    pub fn matches(&self, tag: &str) -> bool {
        match self {
            Self::All => true,
            Self::Tags(tags) => tags.iter().any(|t| t == tag),
        }
    }
}

/// Epoch assignment of TOI markers.
#[derive(Debug, Clone, PartialEq)]
pub struct EventStates {
    /// Indices (into the marker list) of the TOI markers, in order.
    pub markers: Vec<usize>,
    /// Containing epoch per TOI marker; `None` past the hypnogram end.
    pub epochs: Vec<Option<usize>>,
    /// Hypnogram state of that epoch.
    pub states: Vec<Option<u8>>,
    /// Marker indices worth a second look: the marker starts within
    /// `min_pad_sec` of its epoch start and that epoch's state differs from
    /// the previous epoch's.
    pub double_check: Vec<usize>,
}

/// Tagged markers over one recording.
#[derive(Debug, Clone)]
pub struct EventRegistry {
    markers: Vec<Marker>,
    tags: Vec<String>,
    srate: f64,
    toi: TagFilter,
}

impl EventRegistry {
    pub fn new(markers: Vec<Marker>, srate: f64) -> Result<Self> {
        if !(srate > 0.0) || !srate.is_finite() {
            return Err(Error::param("srate", format!("must be > 0, got {srate}")));
        }
        let bad: Vec<usize> = markers
            .iter()
            .enumerate()
            .filter(|(_, m)| m.finish < m.start)
            .map(|(i, _)| i)
            .collect();
        if !bad.is_empty() {
            return Err(Error::InvalidMarkers(bad));
        }
        let mut reg = Self { markers, tags: Vec::new(), srate, toi: TagFilter::All };
        reg.refresh_tags();
        Ok(reg)
    }

    fn refresh_tags(&mut self) {
        let set: BTreeSet<&str> = self.markers.iter().map(|m| m.tag.as_str()).collect();
        self.tags = set.into_iter().map(str::to_string).collect();
    }

    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    pub(crate) fn markers_mut(&mut self) -> &mut [Marker] {
        &mut self.markers
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn srate(&self) -> f64 {
        self.srate
    }

    /// Sorted, de-duplicated tags.
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn push(&mut self, marker: Marker) -> Result<()> {
        if marker.finish < marker.start {
            return Err(Error::InvalidMarkers(vec![self.markers.len()]));
        }
        self.markers.push(marker);
        self.refresh_tags();
        Ok(())
    }

    /// Drop every marker matching `filter`; returns how many were removed.
    pub fn remove_tagged(&mut self, filter: &TagFilter) -> usize {
        let before = self.markers.len();
        self.markers.retain(|m| !filter.matches(&m.tag));
        self.refresh_tags();
        before - self.markers.len()
    }

    /// Membership mask of every marker against `filter`.
    pub fn tagged(&self, filter: &TagFilter) -> Vec<bool> {
        self.markers.iter().map(|m| filter.matches(&m.tag)).collect()
    }

    /// Relabel every `old` marker as `new`; returns the number relabelled.
    pub fn replace_tag(&mut self, old: &str, new: &str) -> usize {
        let mut n = 0;
        for m in self.markers.iter_mut().filter(|m| m.tag == old) {
            m.tag = new.to_string();
            n += 1;
        }
        self.refresh_tags();
        n
    }

    pub fn total(&self, tag: &str) -> usize {
        self.markers.iter().filter(|m| m.tag == tag).count()
    }

    /// `(tag, count)` aligned with [`tags`](Self::tags).
    pub fn totals(&self) -> Vec<(String, usize)> {
        self.tags.iter().map(|t| (t.clone(), self.total(t))).collect()
    }

    pub fn toi(&self) -> &TagFilter {
        &self.toi
    }

    pub fn set_toi(&mut self, toi: TagFilter) {
        self.toi = toi;
    }

    /// Indices of markers selected by the TOI.
    pub fn toi_indices(&self) -> Vec<usize> {
        self.markers
            .iter()
            .enumerate()
            .filter(|(_, m)| self.toi.matches(&m.tag))
            .map(|(i, _)| i)
            .collect()
    }

    fn toi_markers(&self) -> impl Iterator<Item = &Marker> + '_ {
        self.markers.iter().filter(|m| self.toi.matches(&m.tag))
    }

    /// TOI start times in seconds.
    pub fn start_times(&self) -> Vec<f64> {
        self.toi_markers().map(|m| m.start as f64 / self.srate).collect()
    }

    /// TOI end times in seconds.
    pub fn end_times(&self) -> Vec<f64> {
        self.toi_markers().map(|m| m.finish as f64 / self.srate).collect()
    }

    /// TOI durations in seconds.
    pub fn durations(&self) -> Vec<f64> {
        self.toi_markers().map(|m| (m.finish - m.start) as f64 / self.srate).collect()
    }

    /// Histogram of TOI start times in bins of `width_sec`.
    ///
    /// Bins span `[0, ceil(last_start / width) · width]`; the last bin is
    /// closed on the right so the latest event is always counted.  No events
    /// gives an empty histogram.
    pub fn events_per_bin(&self, width_sec: f64) -> Result<Vec<usize>> {
        if !(width_sec > 0.0) {
            return Err(Error::param("bin width", format!("must be > 0, got {width_sec}")));
        }
        let starts = self.start_times();
        let Some(last) = starts.iter().copied().reduce(f64::max) else {
            return Ok(Vec::new());
        };
        let nbins = ((last / width_sec).ceil() as usize).max(1);
        let mut hist = vec![0usize; nbins];
        for t in starts {
            let b = ((t / width_sec).floor() as usize).min(nbins - 1);
            hist[b] += 1;
        }
        Ok(hist)
    }

    /// Histogram of TOI start times with one bin per epoch.
    pub fn events_per_epoch(&self, epoch_sec: f64) -> Result<Vec<usize>> {
        self.events_per_bin(epoch_sec)
    }

    /// Epoch and hypnogram state of every TOI marker.
    ///
    /// The epoch index is `floor(start_time / epoch_sec)`.  A start lying
    /// exactly on the end of the last epoch is assigned to that last epoch.
    /// Flagged markers are also logged at warn level.
    pub fn event_states(&self, hypnogram: &[u8], epoch_sec: f64, min_pad_sec: f64) -> Result<EventStates> {
        if !(epoch_sec > 0.0) {
            return Err(Error::param("epoch_sec", format!("must be > 0, got {epoch_sec}")));
        }
        let n = hypnogram.len();
        let markers = self.toi_indices();
        let mut epochs = Vec::with_capacity(markers.len());
        let mut states = Vec::with_capacity(markers.len());
        let mut double_check = Vec::new();

        for &i in &markers {
            let t = self.markers[i].start as f64 / self.srate;
            let mut e = (t / epoch_sec).floor() as usize;
            if e == n && n > 0 && t == n as f64 * epoch_sec {
                e = n - 1;
            }
            if e >= n {
                epochs.push(None);
                states.push(None);
                continue;
            }
            epochs.push(Some(e));
            states.push(Some(hypnogram[e]));

            let offset = t - e as f64 * epoch_sec;
            if e > 0 && offset < min_pad_sec && hypnogram[e] != hypnogram[e - 1] {
                warn!(
                    "marker {i} ({}) starts {offset:.3} s into epoch {e} right after a state change",
                    self.markers[i].tag
                );
                double_check.push(i);
            }
        }
        Ok(EventStates { markers, epochs, states, double_check })
    }

    /// Per-epoch mask of epochs touched by a marker carrying an excluded tag.
    ///
    /// Each such marker blanks every epoch from the one holding its start to
    /// the one holding its finish, inclusive.
    pub fn exclusion_mask(&self, excluded: &[String], n_epochs: usize, epoch_sec: f64) -> Vec<bool> {
        let mut mask = vec![false; n_epochs];
        if n_epochs == 0 || !(epoch_sec > 0.0) {
            return mask;
        }
        let samples_per_epoch = epoch_sec * self.srate;
        for m in self.markers.iter().filter(|m| excluded.contains(&m.tag)) {
            let first = (m.start as f64 / samples_per_epoch).floor() as usize;
            let last = ((m.finish as f64 / samples_per_epoch).floor() as usize).min(n_epochs - 1);
            for slot in mask.iter_mut().take(last + 1).skip(first) {
                *slot = true;
            }
        }
        mask
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> EventRegistry {
        EventRegistry::new(
            vec![
                Marker::new(1234, 1901, "SWD"),
                Marker::new(4022, 6234, "SWD"),
                Marker::new(7182, 8302, "Art"),
                Marker::new(9100, 9900, "Art"),
                Marker::new(13400, 15985, "SWD"),
            ],
            400.0,
        )
        .unwrap()
    }

    #[test]
    fn tags_sorted_unique() {
        let r = registry();
        assert_eq!(r.tags(), &["Art".to_string(), "SWD".to_string()]);
        assert_eq!(r.totals(), vec![("Art".into(), 2), ("SWD".into(), 3)]);
    }

    #[test]
    fn finish_before_start_rejected() {
        let err = EventRegistry::new(vec![Marker::new(10, 5, "x"), Marker::new(1, 2, "x")], 100.0).unwrap_err();
        assert!(matches!(err, Error::InvalidMarkers(ref p) if p == &vec![0]));
    }

    #[test]
    fn replace_tag_refreshes_tags() {
        let mut r = registry();
        assert_eq!(r.replace_tag("Art", "Noise"), 2);
        assert_eq!(r.tags(), &["Noise".to_string(), "SWD".to_string()]);
        assert_eq!(r.total("SWD"), 3);
    }

    #[test]
    fn exclusion_spans_start_to_finish_epoch() {
        let r = registry();
        // 4 s epochs at 400 Hz = 1600 samples: Art 7182..8302 → epochs 4..=5,
        // Art 9100..9900 → epochs 5..=6.
        let mask = r.exclusion_mask(&["Art".to_string()], 12, 4.0);
        let on: Vec<usize> = mask.iter().enumerate().filter(|(_, &b)| b).map(|(i, _)| i).collect();
        assert_eq!(on, vec![4, 5, 6]);
    }

    #[test]
    fn exclusion_clamped_to_epoch_count() {
        let r = registry();
        let mask = r.exclusion_mask(&["SWD".to_string()], 9, 4.0);
        assert!(mask[8]);
        assert_eq!(mask.len(), 9);
    }

    #[test]
    fn boundary_event_maps_to_last_epoch() {
        let r = EventRegistry::new(vec![Marker::new(800, 900, "SWD"), Marker::new(1000, 1100, "SWD")], 100.0).unwrap();
        // Two 4 s epochs end at 8 s = sample 800.
        let es = r.event_states(&[1, 2], 4.0, 0.5).unwrap();
        assert_eq!(es.epochs, vec![Some(1), None]);
        assert_eq!(es.states, vec![Some(2), None]);
    }

    #[test]
    fn double_check_flags_early_event_after_change() {
        let r = EventRegistry::new(
            vec![
                Marker::new(410, 500, "SWD"), // 0.1 s into epoch 1 (state change 1 → 2)
                Marker::new(850, 900, "SWD"), // 0.5 s into epoch 2 (no change)
                Marker::new(1300, 1350, "SWD"), // 1.0 s into epoch 3 (change, but late)
            ],
            100.0,
        )
        .unwrap();
        let es = r.event_states(&[1, 2, 2, 3], 4.0, 0.8).unwrap();
        assert_eq!(es.states, vec![Some(2), Some(2), Some(3)]);
        assert_eq!(es.double_check, vec![0]);
    }

    #[test]
    fn histogram_counts_every_toi_event() {
        let mut r = registry();
        r.set_toi(TagFilter::tag("SWD"));
        let h = r.events_per_epoch(4.0).unwrap();
        // Last SWD start 33.5 s → ceil(33.5 / 4) = 9 bins.
        assert_eq!(h.len(), 9);
        assert_eq!(h.iter().sum::<usize>(), 3);
        assert_eq!(h[0], 1);
        assert_eq!(h[2], 1);
        assert_eq!(h[8], 1);
    }

    #[test]
    fn empty_tag_list_selects_all() {
        assert_eq!(TagFilter::tags(Vec::<String>::new()), TagFilter::All);
        let r = registry();
        assert_eq!(r.tagged(&TagFilter::tags(["Art"])), vec![false, false, true, true, false]);
    }
}
