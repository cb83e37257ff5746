//! Severity bands and the weighted sensor-value classifier.

use crate::error::{Result, SimulatorError};
use crate::message::MessageType;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Severity band of a sampled value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Band {
    Critical,
    Error,
    Warning,
    Normal,
}

impl Band {
    /// Name used in transition logs ("Value entered WARNING range").
    pub fn label(&self) -> &'static str {
        match self {
            Band::Critical => "CRITICAL",
            Band::Error => "ERROR",
            Band::Warning => "WARNING",
            Band::Normal => "NORMAL",
        }
    }

    /// Message type used when this band is announced. NORMAL goes out as INFO.
    pub fn message_type(&self) -> MessageType {
        match self {
            Band::Critical => MessageType::Critical,
            Band::Error => MessageType::Error,
            Band::Warning => MessageType::Warning,
            Band::Normal => MessageType::Info,
        }
    }
}

impl std::fmt::Display for Band {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Inclusive `[low, high]` value range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Subrange {
    pub low: f64,
    pub high: f64,
}

impl Subrange {
    pub const fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.low && value <= self.high
    }

    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        rng.gen_range(self.low..=self.high)
    }
}

/// One entry of the band table: a band, its value subranges and selection weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandRange {
    pub band: Band,
    pub subranges: Vec<Subrange>,
    pub weight: f64,
}

impl BandRange {
    pub fn new(band: Band, subranges: Vec<Subrange>, weight: f64) -> Self {
        Self {
            band,
            subranges,
            weight,
        }
    }
}

/// Default band table on a 0-100 sensor scale.
pub fn default_bands() -> Vec<BandRange> {
    vec![
        BandRange::new(Band::Normal, vec![Subrange::new(20.0, 70.0)], 70.0),
        BandRange::new(
            Band::Warning,
            vec![Subrange::new(10.0, 20.0), Subrange::new(70.0, 85.0)],
            15.0,
        ),
        BandRange::new(
            Band::Error,
            vec![Subrange::new(5.0, 10.0), Subrange::new(85.0, 95.0)],
            10.0,
        ),
        BandRange::new(
            Band::Critical,
            vec![Subrange::new(0.0, 5.0), Subrange::new(95.0, 100.0)],
            2.0,
        ),
    ]
}

/// Checks a band table for the conditions [`Classifier::classify`] relies on.
pub fn validate_bands(bands: &[BandRange]) -> Result<()> {
    if bands.is_empty() {
        return Err(SimulatorError::InvalidConfig("band table is empty".to_string()));
    }

    let mut total = 0.0;
    for entry in bands {
        if !entry.weight.is_finite() || entry.weight < 0.0 {
            return Err(SimulatorError::InvalidConfig(format!(
                "band {} has invalid weight {}",
                entry.band, entry.weight
            )));
        }
        if entry.subranges.is_empty() {
            return Err(SimulatorError::InvalidConfig(format!(
                "band {} has no subranges",
                entry.band
            )));
        }
        for range in &entry.subranges {
            if !(range.high - range.low).is_finite() || range.low > range.high {
                return Err(SimulatorError::InvalidConfig(format!(
                    "band {} has invalid subrange [{}, {}]",
                    entry.band, range.low, range.high
                )));
            }
        }
        total += entry.weight;
    }

    if !total.is_finite() || total <= 0.0 {
        return Err(SimulatorError::InvalidConfig(
            "band weights must sum to a positive finite total".to_string(),
        ));
    }

    Ok(())
}

/// Result of one classifier draw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub value: f64,
    pub band: Band,
    /// Subrange the value was drawn from.
    pub subrange: Subrange,
}

/// Draws synthetic sensor values from a weighted band table.
#[derive(Debug, Clone)]
pub struct Classifier {
    bands: Vec<BandRange>,
    total_weight: f64,
    /// Weight of every band except CRITICAL.
    calm_weight: f64,
}

impl Classifier {
    pub fn new(bands: Vec<BandRange>) -> Result<Self> {
        validate_bands(&bands)?;
        Ok(Self::from_valid(bands))
    }

    fn from_valid(bands: Vec<BandRange>) -> Self {
        let total_weight = bands.iter().map(|b| b.weight).sum();
        let calm_weight = bands
            .iter()
            .filter(|b| b.band != Band::Critical)
            .map(|b| b.weight)
            .sum();
        Self {
            bands,
            total_weight,
            calm_weight,
        }
    }

    pub fn bands(&self) -> &[BandRange] {
        &self.bands
    }

    /// Whether a draw without the CRITICAL band is possible.
    pub fn can_skip_critical(&self) -> bool {
        self.calm_weight > 0.0
    }

    /// Picks a band by weight, one of its subranges uniformly, then a value
    /// uniformly inside that subrange.
    pub fn classify<R: Rng + ?Sized>(&self, rng: &mut R) -> Sample {
        let entry = self.weighted_choice(rng, true);
        Self::sample_entry(entry, rng)
    }

    /// Same as [`Classifier::classify`] with the CRITICAL band left out of the
    /// weighted choice. Falls back to a full draw when no other band has
    /// weight.
    pub fn classify_without_critical<R: Rng + ?Sized>(&self, rng: &mut R) -> Sample {
        if !self.can_skip_critical() {
            return self.classify(rng);
        }
        let entry = self.weighted_choice(rng, false);
        Self::sample_entry(entry, rng)
    }

    fn sample_entry<R: Rng + ?Sized>(entry: &BandRange, rng: &mut R) -> Sample {
        let subrange = entry.subranges[rng.gen_range(0..entry.subranges.len())];
        Sample {
            value: subrange.sample(rng),
            band: entry.band,
            subrange,
        }
    }

    fn weighted_choice<R: Rng + ?Sized>(&self, rng: &mut R, with_critical: bool) -> &BandRange {
        let total = if with_critical {
            self.total_weight
        } else {
            self.calm_weight
        };
        let candidates = self
            .bands
            .iter()
            .filter(|b| with_critical || b.band != Band::Critical);

        let mut choice = rng.gen_range(0.0..total);
        let mut last = None;
        for entry in candidates {
            if choice < entry.weight {
                return entry;
            }
            choice -= entry.weight;
            if entry.weight > 0.0 {
                last = Some(entry);
            }
        }

        // Float rounding can leave a sliver past the last bucket.
        last.unwrap_or(&self.bands[0])
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::from_valid(default_bands())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;

    fn round2(v: f64) -> f64 {
        (v * 100.0).round() / 100.0
    }

    #[test]
    fn test_default_bands_are_valid() {
        assert!(validate_bands(&default_bands()).is_ok());
    }

    #[test]
    fn test_value_within_selected_subrange() {
        let classifier = Classifier::default();
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..5_000 {
            let sample = classifier.classify(&mut rng);
            assert!(sample.subrange.contains(sample.value));

            let rounded = round2(sample.value);
            assert!(rounded >= sample.subrange.low && rounded <= sample.subrange.high);

            let entry = classifier
                .bands()
                .iter()
                .find(|b| b.band == sample.band)
                .unwrap();
            assert!(entry.subranges.contains(&sample.subrange));
        }
    }

    #[test]
    fn test_weights_drive_band_frequency() {
        let classifier = Classifier::new(vec![
            BandRange::new(Band::Normal, vec![Subrange::new(40.0, 60.0)], 9.0),
            BandRange::new(Band::Critical, vec![Subrange::new(95.0, 100.0)], 1.0),
        ])
        .unwrap();
        let mut rng = StdRng::seed_from_u64(42);

        let mut counts: HashMap<Band, usize> = HashMap::new();
        for _ in 0..10_000 {
            *counts.entry(classifier.classify(&mut rng).band).or_default() += 1;
        }

        let normal = counts[&Band::Normal];
        assert!(normal > 8_500 && normal < 9_500, "normal drawn {} times", normal);
    }

    #[test]
    fn test_zero_weight_band_never_selected() {
        let classifier = Classifier::new(vec![
            BandRange::new(Band::Critical, vec![Subrange::new(95.0, 100.0)], 0.0),
            BandRange::new(Band::Normal, vec![Subrange::new(40.0, 60.0)], 1.0),
        ])
        .unwrap();
        let mut rng = StdRng::seed_from_u64(1);

        for _ in 0..1_000 {
            assert_eq!(classifier.classify(&mut rng).band, Band::Normal);
        }
    }

    #[test]
    fn test_every_subrange_gets_used() {
        let classifier = Classifier::new(vec![BandRange::new(
            Band::Warning,
            vec![Subrange::new(10.0, 20.0), Subrange::new(70.0, 85.0)],
            1.0,
        )])
        .unwrap();
        let mut rng = StdRng::seed_from_u64(3);

        let mut low = 0;
        let mut high = 0;
        for _ in 0..1_000 {
            let sample = classifier.classify(&mut rng);
            if sample.value <= 20.0 {
                low += 1;
            } else {
                high += 1;
            }
        }
        assert!(low > 0 && high > 0);
    }

    #[test]
    fn test_degenerate_subrange() {
        let classifier = Classifier::new(vec![BandRange::new(
            Band::Normal,
            vec![Subrange::new(50.0, 50.0)],
            1.0,
        )])
        .unwrap();
        let mut rng = StdRng::seed_from_u64(9);
        assert_eq!(classifier.classify(&mut rng).value, 50.0);
    }

    #[test]
    fn test_same_seed_same_sequence() {
        let classifier = Classifier::default();
        let mut a = StdRng::seed_from_u64(11);
        let mut b = StdRng::seed_from_u64(11);

        for _ in 0..100 {
            assert_eq!(classifier.classify(&mut a), classifier.classify(&mut b));
        }
    }

    #[test]
    fn test_validate_rejects_bad_tables() {
        assert!(validate_bands(&[]).is_err());
        assert!(validate_bands(&[BandRange::new(Band::Normal, vec![], 1.0)]).is_err());
        assert!(validate_bands(&[BandRange::new(
            Band::Normal,
            vec![Subrange::new(10.0, 5.0)],
            1.0
        )])
        .is_err());
        assert!(validate_bands(&[BandRange::new(
            Band::Normal,
            vec![Subrange::new(0.0, 5.0)],
            -1.0
        )])
        .is_err());
        assert!(validate_bands(&[BandRange::new(
            Band::Normal,
            vec![Subrange::new(0.0, 5.0)],
            0.0
        )])
        .is_err());
    }

    #[test]
    fn test_validate_rejects_infinite_spans_and_totals() {
        assert!(validate_bands(&[BandRange::new(
            Band::Normal,
            vec![Subrange::new(-f64::MAX, f64::MAX)],
            1.0
        )])
        .is_err());
        assert!(validate_bands(&[BandRange::new(
            Band::Normal,
            vec![Subrange::new(f64::NEG_INFINITY, 5.0)],
            1.0
        )])
        .is_err());
        assert!(validate_bands(&[
            BandRange::new(Band::Normal, vec![Subrange::new(40.0, 60.0)], f64::MAX),
            BandRange::new(Band::Warning, vec![Subrange::new(70.0, 85.0)], f64::MAX),
        ])
        .is_err());
        assert!(Classifier::new(vec![BandRange::new(
            Band::Normal,
            vec![Subrange::new(-f64::MAX, f64::MAX)],
            1.0
        )])
        .is_err());
    }

    #[test]
    fn test_classify_without_critical_skips_critical_band() {
        let classifier = Classifier::new(vec![
            BandRange::new(Band::Critical, vec![Subrange::new(95.0, 100.0)], 1_000.0),
            BandRange::new(Band::Normal, vec![Subrange::new(40.0, 60.0)], 1.0),
            BandRange::new(Band::Warning, vec![Subrange::new(70.0, 85.0)], 1.0),
        ])
        .unwrap();
        let mut rng = StdRng::seed_from_u64(5);

        let mut seen = HashMap::new();
        for _ in 0..2_000 {
            let sample = classifier.classify_without_critical(&mut rng);
            assert_ne!(sample.band, Band::Critical);
            assert!(sample.subrange.contains(sample.value));
            *seen.entry(sample.band).or_insert(0) += 1;
        }
        assert!(seen.contains_key(&Band::Normal));
        assert!(seen.contains_key(&Band::Warning));

        // The full draw still reaches CRITICAL.
        assert!((0..100).any(|_| classifier.classify(&mut rng).band == Band::Critical));
    }

    #[test]
    fn test_classify_without_critical_falls_back_on_critical_only_table() {
        let classifier = Classifier::new(vec![BandRange::new(
            Band::Critical,
            vec![Subrange::new(95.0, 100.0)],
            1.0,
        )])
        .unwrap();
        let mut rng = StdRng::seed_from_u64(5);

        assert!(!classifier.can_skip_critical());
        assert_eq!(
            classifier.classify_without_critical(&mut rng).band,
            Band::Critical
        );
        assert!(Classifier::default().can_skip_critical());
    }

    #[test]
    fn test_normal_band_reports_as_info() {
        assert_eq!(Band::Normal.label(), "NORMAL");
        assert_eq!(Band::Normal.message_type(), MessageType::Info);
        assert_eq!(Band::Critical.message_type(), MessageType::Critical);
    }
}
