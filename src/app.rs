use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Serialize;

use rusty_lines::analysis::mode::BandHint;
use rusty_lines::analysis::pipeline::{analyze, AnalysisResult};
use rusty_lines::band::{band_hint, capture_from_band};
use rusty_lines::config::AnalysisConfig;
use rusty_lines::data::loader::{load_capture, load_library};
use rusty_lines::data::model::LineLibrary;
use rusty_lines::report::export::{save_json, save_lines_csv, save_text};
use rusty_lines::report::summary::analysis_log;
use rusty_lines::report::union::{reported_lines, union_lines, LineSource, ReportedLine};

use crate::cli::Cli;

// ---------------------------------------------------------------------------
// Command-line run: load, analyse, merge, write
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct RunReport<'a> {
    dataset: Option<&'a AnalysisResult>,
    band: Option<&'a AnalysisResult>,
    lines: &'a [ReportedLine],
}

pub fn run(cli: &Cli) -> Result<()> {
    let config = cli.analysis_config()?;
    let library = load_library(&cli.library)?;
    let hint = cli.band.as_deref().map_or(BandHint::NONE, band_hint);
    log::info!(
        "mode {} at tolerance {:.2} nm, band hint {hint:?}",
        config.mode,
        config.tolerance_nm
    );

    let dataset = match &cli.dataset {
        Some(path) => Some(analyze_dataset(path, &library, &config, hint)?),
        None => None,
    };
    let band = match &cli.band {
        Some(path) => analyze_band(path, &library, &config, hint, dataset.is_some())?,
        None => None,
    };

    let lines = match (&dataset, &band) {
        (Some(d), Some(b)) => union_lines(d, b),
        (Some(d), None) => reported_lines(d, LineSource::Dataset),
        (None, Some(b)) => reported_lines(b, LineSource::Band),
        (None, None) => bail!("nothing to analyse: pass --dataset and/or --band"),
    };

    let outdir = &cli.outdir;
    std::fs::create_dir_all(outdir).with_context(|| format!("creating {}", outdir.display()))?;
    save_lines_csv(&outdir.join("lines.csv"), &lines)?;
    save_json(
        &outdir.join("result.json"),
        &RunReport {
            dataset: dataset.as_ref(),
            band: band.as_ref(),
            lines: &lines,
        },
    )?;
    if let Some(result) = &dataset {
        save_text(&outdir.join("analysis_log.txt"), &analysis_log(result))?;
    }
    if let Some(result) = &band {
        save_text(&outdir.join("analysis_log_band.txt"), &analysis_log(result))?;
    }

    log::info!("wrote {} lines to {}", lines.len(), outdir.display());
    Ok(())
}

fn analyze_dataset(
    path: &Path,
    library: &LineLibrary,
    config: &AnalysisConfig,
    hint: BandHint,
) -> Result<AnalysisResult> {
    let capture = load_capture(path)
        .with_context(|| format!("loading capture {}", path.display()))?;
    analyze(&capture, library, config, hint)
        .with_context(|| format!("analysing {}", path.display()))
}

/// The band run is optional when a dataset exists: an unusable photo is
/// logged and skipped.
fn analyze_band(
    path: &Path,
    library: &LineLibrary,
    config: &AnalysisConfig,
    hint: BandHint,
    have_dataset: bool,
) -> Result<Option<AnalysisResult>> {
    let outcome = capture_from_band(path).and_then(|capture| {
        analyze(&capture, library, config, hint)
            .with_context(|| format!("analysing band {}", path.display()))
    });
    match outcome {
        Ok(result) => Ok(Some(result)),
        Err(err) if have_dataset => {
            log::warn!("skipping band capture: {err:#}");
            Ok(None)
        }
        Err(err) => Err(err),
    }
}
