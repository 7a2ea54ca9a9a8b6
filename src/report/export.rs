use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use super::union::ReportedLine;

pub const LINES_HEADER: [&str; 12] = [
    "Measured_nm",
    "Corrected_nm",
    "Pixel",
    "Type",
    "Element/Species",
    "Ref_nm",
    "Delta_nm",
    "Relative_Strength",
    "Score",
    "Flags",
    "Sigma",
    "Source",
];

/// Write labels as `lines.csv` rows, in the order given.
pub fn write_lines_csv<W: Write>(writer: W, lines: &[ReportedLine]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(LINES_HEADER)
        .context("writing lines header")?;
    for reported in lines {
        let m = &reported.line;
        let pixel = match m.pixel {
            Some(px) => format!("{px:.1}"),
            None => "nan".to_string(),
        };
        wtr.write_record([
            format!("{:.3}", m.measured_nm),
            format!("{:.3}", m.corrected_nm),
            pixel,
            reported.mode.short().to_string(),
            m.species.clone(),
            format!("{:.3}", m.ref_nm),
            format!("{:+.3}", m.residual_nm),
            format!("{:.3}", m.rel_strength),
            format!("{:.1}", m.score),
            m.flags_label(),
            m.sigma.to_string(),
            reported.source.as_str().to_string(),
        ])
        .with_context(|| format!("writing line {} {:.3}", m.species, m.ref_nm))?;
    }
    wtr.flush().context("flushing lines csv")?;
    Ok(())
}

pub fn save_lines_csv(path: &Path, lines: &[ReportedLine]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    write_lines_csv(BufWriter::new(file), lines)
}

/// Pretty-printed JSON of any serialisable result.
pub fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value).context("serialising JSON")?;
    writer.flush()?;
    Ok(())
}

pub fn save_text(path: &Path, text: &str) -> Result<()> {
    std::fs::write(path, text).with_context(|| format!("writing {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::mode::SpectrumMode;
    use crate::data::model::{LibraryEntry, LineKind, Match, MatchFlag};
    use crate::report::union::LineSource;

    fn line() -> ReportedLine {
        let entry = LibraryEntry {
            species: "Hg".into(),
            ref_nm: 546.074,
            kind: LineKind::Atom,
        };
        let mut m = Match::new(&entry, 545.9, 0.1, 0.8, 48.0);
        m.flags.insert(MatchFlag::WeakEvidence);
        m.sigma = 6;
        m.pixel = Some(412.3);
        ReportedLine {
            line: m,
            mode: SpectrumMode::Emission,
            source: LineSource::Dataset,
        }
    }

    #[test]
    fn csv_row_layout() {
        let mut buf = Vec::new();
        write_lines_csv(&mut buf, &[line()]).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut rows = text.lines();
        assert_eq!(rows.next().unwrap(), LINES_HEADER.join(","));
        assert_eq!(
            rows.next().unwrap(),
            "545.900,546.000,412.3,em,Hg,546.074,+0.074,0.800,48.0,weak_evidence,6,dataset"
        );
        assert!(rows.next().is_none());
    }

    #[test]
    fn missing_pixel_is_nan() {
        let mut l = line();
        l.line.pixel = None;
        let mut buf = Vec::new();
        write_lines_csv(&mut buf, &[l]).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.lines().nth(1).unwrap().contains(",nan,em,"));
    }

    #[test]
    fn json_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lines.json");
        save_json(&path, &vec![line()]).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value[0]["species"], "Hg");
        assert_eq!(value[0]["source"], "dataset");
        assert_eq!(value[0]["flags"][0], "weak_evidence");
    }
}
