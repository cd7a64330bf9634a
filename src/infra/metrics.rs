// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Appends one CSV row per logged training step.
//
// Columns:
//   step, loss, factual_loss, log_loss, regularization, cf_loss, mse_loss
//
// Example:
//   step,loss,factual_loss,log_loss,regularization,cf_loss,mse_loss
//   1,1.893100,0.693147,0.693147,0.000000,1.199953,0.250000
//   2,1.704020,0.690112,0.690112,0.000000,1.013908,0.248489
//
// How to read it:
//   - loss should fall; cf_loss usually falls fastest early on
//   - log_loss flat while cf_loss falls → cf_pen dominates, lower it

use anyhow::{Context, Result};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use crate::ml::loss::LossValues;

const HEADER: &str = "step,loss,factual_loss,log_loss,regularization,cf_loss,mse_loss";

pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Writes the header if the file is new; existing files are
    /// appended to so consecutive runs share one log.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .with_context(|| format!("Cannot create metrics directory '{}'", dir.display()))?;

        let csv_path = dir.join("metrics.csv");
        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)
                .with_context(|| format!("Cannot create '{}'", csv_path.display()))?;
            writeln!(f, "{HEADER}")?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    pub fn log(&self, step: usize, m: &LossValues) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)
            .with_context(|| format!("Cannot open '{}'", self.csv_path.display()))?;

        writeln!(
            f,
            "{},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6}",
            step,
            m.loss,
            m.factual_loss,
            m.log_loss,
            m.regularization,
            m.cf_loss,
            m.mse_loss,
        )?;
        Ok(())
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(loss: f64) -> LossValues {
        LossValues {
            loss,
            factual_loss:   0.5,
            log_loss:       0.5,
            regularization: 0.0,
            cf_loss:        loss - 0.5,
            mse_loss:       0.25,
        }
    }

    #[test]
    fn test_header_then_one_row_per_step() {
        let dir = std::env::temp_dir().join(format!("prod2vec-metrics-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);

        let logger = MetricsLogger::new(&dir).unwrap();
        logger.log(1, &values(1.5)).unwrap();
        logger.log(2, &values(1.0)).unwrap();

        let text  = fs::read_to_string(logger.csv_path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], HEADER);
        assert!(lines[1].starts_with("1,1.500000,"));
        assert!(lines[2].starts_with("2,1.000000,"));

        // Reopening keeps existing rows and does not repeat the header
        let again = MetricsLogger::new(&dir).unwrap();
        again.log(3, &values(0.9)).unwrap();
        let text = fs::read_to_string(again.csv_path()).unwrap();
        assert_eq!(text.lines().count(), 4);

        fs::remove_dir_all(&dir).ok();
    }
}
