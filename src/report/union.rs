use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use serde::Serialize;

use crate::analysis::mode::SpectrumMode;
use crate::analysis::pipeline::AnalysisResult;
use crate::data::model::Match;

/// Which capture a reported line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LineSource {
    Dataset,
    Band,
    Both,
}

impl LineSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            LineSource::Dataset => "dataset",
            LineSource::Band => "band",
            LineSource::Both => "both",
        }
    }
}

/// A final label with the interpretation and capture it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportedLine {
    #[serde(flatten)]
    pub line: Match,
    pub mode: SpectrumMode,
    pub source: LineSource,
}

impl ReportedLine {
    fn outranks(&self, other: &ReportedLine) -> bool {
        self.line.score > other.line.score
            || (self.line.score == other.line.score && self.line.sigma > other.line.sigma)
    }
}

/// Tag every label of one result with its source.
pub fn reported_lines(result: &AnalysisResult, source: LineSource) -> Vec<ReportedLine> {
    result
        .matches
        .iter()
        .map(|m| ReportedLine {
            line: m.clone(),
            mode: result.mode,
            source,
        })
        .collect()
}

/// Merge the dataset and band results by identity key.
///
/// A key seen in both keeps the record with the higher (score, sigma), the
/// dataset record on a tie, and is tagged [`LineSource::Both`]. The result
/// is ordered by reference wavelength.
pub fn union_lines(dataset: &AnalysisResult, band: &AnalysisResult) -> Vec<ReportedLine> {
    let mut merged = BTreeMap::new();
    let incoming = reported_lines(dataset, LineSource::Dataset)
        .into_iter()
        .chain(reported_lines(band, LineSource::Band));
    for line in incoming {
        match merged.entry(line.line.key()) {
            Entry::Vacant(slot) => {
                slot.insert(line);
            }
            Entry::Occupied(mut slot) => {
                if line.outranks(slot.get()) {
                    slot.insert(line);
                }
                slot.get_mut().source = LineSource::Both;
            }
        }
    }

    let mut lines: Vec<ReportedLine> = merged.into_values().collect();
    lines.sort_by(|a, b| {
        a.line
            .ref_nm
            .total_cmp(&b.line.ref_nm)
            .then_with(|| a.line.species.cmp(&b.line.species))
    });
    log::info!(
        "union: {} dataset + {} band labels → {}",
        dataset.matches.len(),
        band.matches.len(),
        lines.len()
    );
    lines
}
