//! Write a synthetic fluorescent-lamp capture for trying the CLI.
//!
//! Usage: `generate_sample [outdir]` → `sample_capture.csv` and
//! `sample_capture.parquet` with flat `px,R,G,B` columns.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{ArrayRef, Float64Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;

use rusty_lines::analysis::calibration::factory_nm;

const PIXELS: usize = 1280;
const FULL_SCALE: f64 = 250.0;
const NOISE: f64 = 1.5;

/// (centre nm, sigma nm, amplitude): Hg lines on top of Eu/Tb phosphor bands.
const EMITTERS: [(f64, f64, f64); 9] = [
    (404.656, 0.6, 0.30),
    (435.833, 0.6, 0.80),
    (487.0, 3.0, 0.20),
    (543.5, 3.0, 0.35),
    (546.074, 0.6, 1.00),
    (576.960, 0.6, 0.20),
    (579.066, 0.6, 0.20),
    (611.6, 4.0, 0.70),
    (707.0, 2.5, 0.08),
];

/// Camera channel sensitivities (centre nm, width nm), in R, G, B order.
const CHANNELS: [(f64, f64); 3] = [(610.0, 55.0), (540.0, 45.0), (455.0, 40.0)];

fn gaussian(x: f64, mu: f64, sigma: f64) -> f64 {
    (-(x - mu).powi(2) / (2.0 * sigma * sigma)).exp()
}

/// SplitMix64; enough for reproducible sensor noise.
struct Noise(u64);

impl Noise {
    fn next_f64(&mut self) -> f64 {
        self.0 = self.0.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.0;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^= z >> 31;
        (z >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Uniform in `[-amplitude, amplitude]`.
    fn jitter(&mut self, amplitude: f64) -> f64 {
        (2.0 * self.next_f64() - 1.0) * amplitude
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let outdir = std::env::args()
        .nth(1)
        .map_or_else(|| PathBuf::from("."), PathBuf::from);
    std::fs::create_dir_all(&outdir).with_context(|| format!("creating {}", outdir.display()))?;

    let mut noise = Noise(42);
    let px: Vec<f64> = (0..PIXELS).map(|i| i as f64).collect();
    let mut channels: [Vec<f64>; 3] = Default::default();
    for &p in &px {
        let nm = factory_nm(p);
        let light: f64 = EMITTERS
            .iter()
            .map(|&(mu, sigma, amp)| amp * gaussian(nm, mu, sigma))
            .sum();
        for (channel, &(centre, width)) in channels.iter_mut().zip(CHANNELS.iter()) {
            let level =
                FULL_SCALE * light * gaussian(nm, centre, width) + 3.0 + noise.jitter(NOISE);
            channel.push(level.clamp(0.0, 255.0).round());
        }
    }
    let [r, g, b] = channels;

    let csv_path = outdir.join("sample_capture.csv");
    let mut wtr = csv::Writer::from_path(&csv_path)
        .with_context(|| format!("creating {}", csv_path.display()))?;
    wtr.write_record(["px", "R", "G", "B"])?;
    for i in 0..PIXELS {
        wtr.write_record([px[i], r[i], g[i], b[i]].map(|v| v.to_string()))?;
    }
    wtr.flush()?;

    let schema = Arc::new(Schema::new(
        ["px", "R", "G", "B"]
            .into_iter()
            .map(|name| Field::new(name, DataType::Float64, false))
            .collect::<Vec<_>>(),
    ));
    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(Float64Array::from(px)) as ArrayRef,
            Arc::new(Float64Array::from(r)) as ArrayRef,
            Arc::new(Float64Array::from(g)) as ArrayRef,
            Arc::new(Float64Array::from(b)) as ArrayRef,
        ],
    )
    .context("building record batch")?;

    let parquet_path = outdir.join("sample_capture.parquet");
    let file = std::fs::File::create(&parquet_path)
        .with_context(|| format!("creating {}", parquet_path.display()))?;
    let mut writer = ArrowWriter::try_new(file, schema, None).context("creating parquet writer")?;
    writer.write(&batch).context("writing parquet batch")?;
    writer.close().context("closing parquet writer")?;

    println!(
        "Wrote {PIXELS} samples to {} and {}",
        csv_path.display(),
        parquet_path.display()
    );
    Ok(())
}
