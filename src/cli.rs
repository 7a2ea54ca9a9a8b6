use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use rusty_lines::config::{AnalysisConfig, ModeSetting};

#[derive(Parser, Debug)]
#[command(
    name = "rusty-lines",
    version,
    about = "Identify emission and absorption lines in spectrometer captures"
)]
pub struct Cli {
    /// Capture file (.csv, .json or .parquet).
    #[arg(long, required_unless_present = "band")]
    pub dataset: Option<PathBuf>,

    /// Photo of the dispersed band (.png or .jpg).
    #[arg(long)]
    pub band: Option<PathBuf>,

    /// Reference line library (JSON).
    #[arg(long, default_value = "data/line_library.json")]
    pub library: PathBuf,

    /// auto, emission or absorption.
    #[arg(long)]
    pub mode: Option<ModeSetting>,

    #[arg(long)]
    pub tolerance_nm: Option<f64>,

    #[arg(long)]
    pub min_dist_nm: Option<f64>,

    /// JSON file with analysis settings; flags override it.
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long, default_value = "out")]
    pub outdir: PathBuf,
}

impl Cli {
    pub fn analysis_config(&self) -> Result<AnalysisConfig> {
        let mut config = match &self.config {
            Some(path) => AnalysisConfig::from_json_file(path)?,
            None => AnalysisConfig::default(),
        };
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(tol) = self.tolerance_nm {
            config.tolerance_nm = tol;
        }
        if let Some(dist) = self.min_dist_nm {
            config.min_dist_nm = dist;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "rusty-lines",
            "--dataset",
            "capture.csv",
            "--mode",
            "abs",
            "--tolerance-nm",
            "3.5",
        ])
        .unwrap();
        let config = cli.analysis_config().unwrap();
        assert_eq!(config.mode, ModeSetting::Absorption);
        assert_eq!(config.tolerance_nm, 3.5);
        assert_eq!(config.min_dist_nm, AnalysisConfig::default().min_dist_nm);
        assert_eq!(cli.outdir, PathBuf::from("out"));
    }

    #[test]
    fn band_alone_is_enough() {
        assert!(Cli::try_parse_from(["rusty-lines", "--band", "band.png"]).is_ok());
        assert!(Cli::try_parse_from(["rusty-lines"]).is_err());
    }

    #[test]
    fn config_file_is_overridden_by_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.json");
        std::fs::write(&path, r#"{ "mode": "emission", "min_dist_nm": 1.2 }"#).unwrap();
        let cli = Cli::try_parse_from([
            "rusty-lines",
            "--dataset",
            "capture.csv",
            "--config",
            path.to_str().unwrap(),
            "--min-dist-nm",
            "0.8",
        ])
        .unwrap();
        let config = cli.analysis_config().unwrap();
        assert_eq!(config.mode, ModeSetting::Emission);
        assert_eq!(config.min_dist_nm, 0.8);
    }
}
