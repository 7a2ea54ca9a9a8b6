use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use arrow::array::{Array, Float32Array, Float64Array, Int32Array, Int64Array};
use arrow::datatypes::DataType;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::Value as JsonValue;

use super::model::{LibraryEntry, LineKind, LineLibrary, RawCapture, Signal};
use crate::error::{EngineError, EngineResult};

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Load a capture from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.csv`     – header row, one sample per row (`px,R,G,B` or `px,nm,R,G,B`)
/// * `.json`    – `[{ "px": 0, "R": 12, "G": 40, "B": 7 }, ...]`
/// * `.parquet` – flat numeric columns with the same names as the CSV
pub fn load_capture(path: &Path) -> Result<RawCapture> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let table = match ext.as_str() {
        "csv" | "txt" => {
            let file = std::fs::File::open(path).context("opening CSV")?;
            read_csv_table(file)?
        }
        "json" => {
            let text = std::fs::read_to_string(path).context("reading JSON file")?;
            json_table(&text)?
        }
        "parquet" | "pq" => parquet_table(path)?,
        other => bail!("Unsupported capture extension: .{other}"),
    };
    log::debug!(
        "loaded {} rows with columns {:?} from {}",
        table.rows(),
        table.headers,
        path.display()
    );
    Ok(table.into_capture()?)
}

/// Parse a CSV capture from any reader.
pub fn read_csv_capture<R: Read>(reader: R) -> Result<RawCapture> {
    Ok(read_csv_table(reader)?.into_capture()?)
}

/// Parse a JSON records capture.
pub fn parse_json_capture(text: &str) -> Result<RawCapture> {
    Ok(json_table(text)?.into_capture()?)
}

// ---------------------------------------------------------------------------
// Column table shared by all formats
// ---------------------------------------------------------------------------

/// Column-oriented view of a dataset before column roles are resolved.
struct Table {
    headers: Vec<String>,
    columns: Vec<Vec<f64>>,
    /// `false` when a column holds anything that is not a number.
    numeric: Vec<bool>,
}

impl Table {
    fn rows(&self) -> usize {
        self.columns.first().map_or(0, Vec::len)
    }

    fn find(&self, names: &[&str]) -> Option<usize> {
        self.headers
            .iter()
            .position(|h| names.contains(&normalize_column(h).as_str()))
    }

    /// Resolve pixel / wavelength / colour columns.
    ///
    /// Colour columns fall back to an intensity column and then to the first
    /// three remaining numeric columns.
    fn into_capture(self) -> EngineResult<RawCapture> {
        let px_idx = self
            .find(&["px", "pixel", "pix", "x"])
            .ok_or(EngineError::MissingPixelColumn)?;
        let nm_idx = self.find(&["nm", "nanometer", "wavelen", "wavelength"]);

        let rgb = match (
            self.find(&["r", "red"]),
            self.find(&["g", "green"]),
            self.find(&["b", "blue"]),
        ) {
            (Some(r), Some(g), Some(b)) => Some([r, g, b]),
            _ => None,
        };
        let intensity_idx = self.find(&["i", "intensity", "int"]);

        let signal = if let Some([r, g, b]) = rgb {
            Signal::Rgb(zip_rgb(&self.columns[r], &self.columns[g], &self.columns[b]))
        } else if let Some(i) = intensity_idx {
            Signal::Intensity(self.columns[i].clone())
        } else {
            let rest: Vec<usize> = (0..self.headers.len())
                .filter(|&i| i != px_idx && Some(i) != nm_idx && self.numeric[i])
                .collect();
            if rest.len() < 3 {
                return Err(EngineError::MissingColorColumns);
            }
            log::warn!(
                "no R/G/B headers; using columns {:?}, {:?}, {:?} as colour channels",
                self.headers[rest[0]],
                self.headers[rest[1]],
                self.headers[rest[2]]
            );
            Signal::Rgb(zip_rgb(
                &self.columns[rest[0]],
                &self.columns[rest[1]],
                &self.columns[rest[2]],
            ))
        };

        let mut columns = self.columns;
        let wavelength = nm_idx.map(|i| std::mem::take(&mut columns[i]));
        let pixel = std::mem::take(&mut columns[px_idx]);

        Ok(RawCapture {
            pixel,
            wavelength,
            signal,
        })
    }
}

fn zip_rgb(r: &[f64], g: &[f64], b: &[f64]) -> Vec<[f64; 3]> {
    r.iter()
        .zip(g)
        .zip(b)
        .map(|((&r, &g), &b)| [r, g, b])
        .collect()
}

/// Lower-case, fold Swedish vowels, drop spaces, dashes and underscores.
fn normalize_column(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .chars()
        .filter_map(|c| match c {
            'å' | 'ä' => Some('a'),
            'ö' => Some('o'),
            ' ' | '-' | '_' => None,
            other => Some(other),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// CSV
// ---------------------------------------------------------------------------

fn read_csv_table<R: Read>(reader: R) -> Result<Table> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers: Vec<String> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let mut columns = vec![Vec::new(); headers.len()];
    let mut numeric = vec![true; headers.len()];

    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        for (col, column) in columns.iter_mut().enumerate() {
            let cell = record.get(col).unwrap_or("");
            let value = if cell.is_empty() {
                f64::NAN
            } else {
                cell.parse::<f64>().unwrap_or_else(|_| {
                    numeric[col] = false;
                    f64::NAN
                })
            };
            column.push(value);
        }
    }

    Ok(Table {
        headers,
        columns,
        numeric,
    })
}

// ---------------------------------------------------------------------------
// JSON
// ---------------------------------------------------------------------------

/// Expected JSON schema (records-oriented, `df.to_json(orient='records')`):
///
/// ```json
/// [
///   { "px": 0, "nm": 375.8, "R": 12, "G": 40, "B": 7 },
///   ...
/// ]
/// ```
fn json_table(text: &str) -> Result<Table> {
    let root: JsonValue = serde_json::from_str(text).context("parsing JSON")?;
    let records = root.as_array().context("Expected top-level JSON array")?;

    let mut headers: Vec<String> = Vec::new();
    for (i, rec) in records.iter().enumerate() {
        let obj = rec
            .as_object()
            .with_context(|| format!("Row {i} is not a JSON object"))?;
        for key in obj.keys() {
            if !headers.contains(key) {
                headers.push(key.clone());
            }
        }
    }

    let mut columns = vec![Vec::with_capacity(records.len()); headers.len()];
    let mut numeric = vec![true; headers.len()];
    for rec in records {
        // Every record was checked to be an object above.
        let Some(obj) = rec.as_object() else { continue };
        for (col, key) in headers.iter().enumerate() {
            let value = match obj.get(key) {
                Some(JsonValue::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
                Some(JsonValue::Null) | None => f64::NAN,
                Some(_) => {
                    numeric[col] = false;
                    f64::NAN
                }
            };
            columns[col].push(value);
        }
    }

    Ok(Table {
        headers,
        columns,
        numeric,
    })
}

// ---------------------------------------------------------------------------
// Parquet
// ---------------------------------------------------------------------------

/// Load a Parquet capture: one row per sample, flat numeric columns.
///
/// Works with files written by both **Pandas** (`df.to_parquet()`) and
/// **Polars** (`df.write_parquet()`).
fn parquet_table(path: &Path) -> Result<Table> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder =
        ParquetRecordBatchReaderBuilder::try_new(file).context("reading parquet metadata")?;
    let headers: Vec<String> = builder
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    let reader = builder.build().context("building parquet reader")?;

    let mut columns = vec![Vec::new(); headers.len()];
    let mut numeric = vec![true; headers.len()];

    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        for (col, column) in columns.iter_mut().enumerate() {
            match extract_f64_column(batch.column(col)) {
                Some(values) => column.extend(values),
                None => {
                    numeric[col] = false;
                    column.extend(std::iter::repeat(f64::NAN).take(batch.num_rows()));
                }
            }
        }
    }

    Ok(Table {
        headers,
        columns,
        numeric,
    })
}

/// Numeric Arrow column as `f64`, nulls as NaN. `None` for other types.
fn extract_f64_column(col: &Arc<dyn Array>) -> Option<Vec<f64>> {
    let values = match col.data_type() {
        DataType::Float64 => {
            let arr = col.as_any().downcast_ref::<Float64Array>()?;
            arr.iter().map(|v| v.unwrap_or(f64::NAN)).collect()
        }
        DataType::Float32 => {
            let arr = col.as_any().downcast_ref::<Float32Array>()?;
            arr.iter().map(|v| v.map_or(f64::NAN, f64::from)).collect()
        }
        DataType::Int64 => {
            let arr = col.as_any().downcast_ref::<Int64Array>()?;
            arr.iter()
                .map(|v| v.map_or(f64::NAN, |i| i as f64))
                .collect()
        }
        DataType::Int32 => {
            let arr = col.as_any().downcast_ref::<Int32Array>()?;
            arr.iter().map(|v| v.map_or(f64::NAN, f64::from)).collect()
        }
        _ => return None,
    };
    Some(values)
}

// ---------------------------------------------------------------------------
// Line library
// ---------------------------------------------------------------------------

/// Load the reference line library (JSON array of `{species, ref_nm, kind}`).
pub fn load_library(path: &Path) -> EngineResult<LineLibrary> {
    if !path.exists() {
        return Err(EngineError::LibraryNotFound(path.to_path_buf()));
    }
    let text = std::fs::read_to_string(path)
        .map_err(|e| EngineError::LibraryLoad(format!("{}: {e}", path.display())))?;
    let library = parse_library(&text)?;
    log::info!(
        "loaded {} reference lines from {}",
        library.len(),
        path.display()
    );
    Ok(library)
}

pub fn parse_library(text: &str) -> EngineResult<LineLibrary> {
    let root: JsonValue =
        serde_json::from_str(text).map_err(|e| EngineError::LibraryLoad(e.to_string()))?;
    let records = root
        .as_array()
        .ok_or_else(|| EngineError::LibraryLoad("expected a top-level JSON array".into()))?;

    let entries = records
        .iter()
        .enumerate()
        .map(|(index, rec)| library_entry(index, rec))
        .collect::<EngineResult<Vec<_>>>()?;
    LineLibrary::new(entries)
}

fn library_entry(index: usize, rec: &JsonValue) -> EngineResult<LibraryEntry> {
    let invalid = |reason: &str| EngineError::InvalidLibraryEntry {
        index,
        reason: reason.to_string(),
    };
    let obj = rec.as_object().ok_or_else(|| invalid("not an object"))?;

    let species = match obj.get("species") {
        Some(JsonValue::String(s)) => s.trim().to_string(),
        Some(JsonValue::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };
    let ref_nm = match obj.get("ref_nm") {
        Some(JsonValue::Number(n)) => n.as_f64().ok_or_else(|| invalid("ref_nm out of range"))?,
        Some(JsonValue::String(s)) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| invalid("ref_nm is not numeric"))?,
        _ => return Err(invalid("missing ref_nm")),
    };
    let kind = obj
        .get("kind")
        .and_then(JsonValue::as_str)
        .map_or(LineKind::Atom, LineKind::from_label);

    Ok(LibraryEntry {
        species,
        ref_nm,
        kind,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_with_wavelength_and_rgb() {
        let text = "Pixel,Wavelength,R,G,B\n0,400.0,1,2,3\n1,400.5,4,9,1\n2,401.0,0,0,7\n";
        let cap = read_csv_capture(text.as_bytes()).unwrap();
        assert_eq!(cap.pixel, vec![0.0, 1.0, 2.0]);
        assert_eq!(cap.wavelength, Some(vec![400.0, 400.5, 401.0]));
        assert_eq!(cap.signal.scalar(), vec![3.0, 9.0, 7.0]);
    }

    #[test]
    fn csv_column_names_are_normalised() {
        let text = "PIX , Röd,Green,Blue\n0,1,1,1\n1,2,2,2\n2,3,3,3\n";
        // "Röd" is not a recognised name, so the numeric fallback kicks in.
        let cap = read_csv_capture(text.as_bytes()).unwrap();
        assert!(cap.wavelength.is_none());
        assert_eq!(cap.signal.scalar(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn csv_intensity_column() {
        let text = "px,intensity\n0,0.1\n1,0.5\n2,0.2\n";
        let cap = read_csv_capture(text.as_bytes()).unwrap();
        assert_eq!(cap.signal, Signal::Intensity(vec![0.1, 0.5, 0.2]));
    }

    #[test]
    fn csv_without_pixel_is_a_configuration_error() {
        let text = "nm,R,G,B\n400,1,2,3\n";
        let err = read_csv_capture(text.as_bytes()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::MissingPixelColumn)
        ));
    }

    #[test]
    fn csv_without_colour_is_a_configuration_error() {
        let text = "px,label,R\n0,a,1\n1,b,2\n";
        let err = read_csv_capture(text.as_bytes()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::MissingColorColumns)
        ));
    }

    #[test]
    fn json_records() {
        let text = r#"[{"px": 0, "R": 1, "G": 2, "B": 3}, {"px": 1, "R": 5, "G": 0, "B": 0}]"#;
        let cap = parse_json_capture(text).unwrap();
        assert_eq!(cap.pixel, vec![0.0, 1.0]);
        assert_eq!(cap.signal.scalar(), vec![3.0, 5.0]);
    }

    #[test]
    fn library_parses_kinds_and_string_numbers() {
        let lib = parse_library(
            r#"[
                {"species": "Hg", "ref_nm": 435.833},
                {"species": "N2 2P", "ref_nm": "337.1", "kind": "Band"}
            ]"#,
        )
        .unwrap();
        assert_eq!(lib.len(), 2);
        assert_eq!(lib.entries()[0].kind, LineKind::Atom);
        assert_eq!(lib.entries()[1].kind, LineKind::Band);
        assert_eq!(lib.entries()[1].ref_nm, 337.1);
    }

    #[test]
    fn library_rejects_non_numeric_ref() {
        let err = parse_library(r#"[{"species": "Hg", "ref_nm": 435.8}, {"species": "Na"}]"#)
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidLibraryEntry { index: 1, .. }));
        let err = parse_library(r#"[{"species": "Na", "ref_nm": "abc"}]"#).unwrap_err();
        assert!(matches!(err, EngineError::InvalidLibraryEntry { index: 0, .. }));
    }

    #[test]
    fn missing_library_file() {
        let err = load_library(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(matches!(err, EngineError::LibraryNotFound(_)));
    }

    #[test]
    fn capture_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.csv");
        std::fs::write(&path, "px,R,G,B\n0,1,1,1\n1,2,2,2\n2,3,3,3\n").unwrap();
        let cap = load_capture(&path).unwrap();
        assert_eq!(cap.len(), 3);

        let bad = dir.path().join("capture.xlsx");
        std::fs::write(&bad, "").unwrap();
        assert!(load_capture(&bad).is_err());
    }
}
