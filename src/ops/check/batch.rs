//! Static checks over many projects at once.
//!
//! Static checks bind no port, so unlike runtime validation they can run in
//! parallel.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;
use rayon::prelude::*;
use serde::Serialize;

use crate::util::fs::glob_dirs;

use super::{validate_syntactic, CheckOptions, SyntacticReport};

/// Per-project reports plus totals.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    /// Reports keyed by project directory name
    pub results: BTreeMap<String, SyntacticReport>,
    pub summary: BatchSummary,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BatchSummary {
    pub valid_count: usize,
    pub total_count: usize,
    pub error_count: usize,
    /// `valid_count / total_count`, 0 for an empty batch
    pub success_rate: f64,
}

impl BatchSummary {
    fn from_results(results: &BTreeMap<String, SyntacticReport>) -> Self {
        let valid_count = results.values().filter(|r| r.valid).count();
        let total_count = results.len();
        let error_count = results.values().map(|r| r.error_count).sum();
        let success_rate = if total_count > 0 {
            valid_count as f64 / total_count as f64
        } else {
            0.0
        };

        BatchSummary {
            valid_count,
            total_count,
            error_count,
            success_rate,
        }
    }
}

/// Check every directory under `base` matching `pattern`.
pub fn check_batch(
    base: &Path,
    pattern: &str,
    opts: &CheckOptions,
    jobs: Option<usize>,
) -> Result<BatchReport> {
    let dirs = glob_dirs(base, pattern)?;
    tracing::info!("Checking {} projects under {}", dirs.len(), base.display());

    let check_all = || {
        dirs.par_iter()
            .map(|dir| {
                let name = dir
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| dir.display().to_string());
                let report = validate_syntactic(dir, opts);
                if report.valid {
                    tracing::info!("  {}: valid ({} files)", name, report.total_files);
                } else {
                    tracing::warn!(
                        "  {}: {} errors in {} files",
                        name,
                        report.error_count,
                        report.total_files
                    );
                }
                (name, report)
            })
            .collect::<BTreeMap<_, _>>()
    };

    let results = match jobs {
        Some(j) => rayon::ThreadPoolBuilder::new()
            .num_threads(j)
            .build()?
            .install(check_all),
        None => check_all(),
    };

    let summary = BatchSummary::from_results(&results);
    Ok(BatchReport { results, summary })
}
