//! Seed export to a directory.
//!
//! Layout:
//! - `seed_<index>_0x<command>.bin`: one wire-format record per seed
//! - `summary.csv`: one row per seed
//! - `artifacts.json`: [`ArtifactIndex`] over all of the above

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use serde::Serialize;

use seedhook_control::SeedRecordWire;
use seedhook_engine::SeedRecord;

use crate::error::HarnessError;
use crate::structured_log::{ArtifactIndex, LogEmitter, LogLevel, Outcome};

pub const SUMMARY_FILE: &str = "summary.csv";
pub const ARTIFACT_INDEX_FILE: &str = "artifacts.json";

pub const CSV_HEADER: &str = "index,sequence,command,category,source,serialized,params_size,\
response_size,client,object,status,latency_us,gpu_instance,offloaded,ctrl_flags,timestamp_ns";

/// `seed_0003_0x20800100.bin`
#[must_use]
pub fn seed_file_name(index: usize, command: u32) -> String {
    format!("seed_{index:04}_0x{command:08X}.bin")
}

/// Command class: the upper 16 bits of the command id.
#[must_use]
pub fn command_category(command: u32) -> u16 {
    (command >> 16) as u16
}

fn yes_no(b: bool) -> &'static str {
    if b { "Yes" } else { "No" }
}

/// One `summary.csv` row, without the trailing newline.
#[must_use]
pub fn csv_row(index: usize, seed: &SeedRecord) -> String {
    let mut row = String::with_capacity(160);
    let _ = write!(
        row,
        "{index},{},0x{:08X},0x{:04X},{},{},{},{},0x{:08X},0x{:08X},0x{:08X},{},{},{},0x{:08X},{}",
        seed.sequence,
        seed.command,
        command_category(seed.command),
        seed.source.label(),
        yes_no(seed.serialized),
        seed.params.len(),
        seed.response.len(),
        seed.client,
        seed.object,
        seed.response_status,
        seed.latency_us,
        seed.gpu_instance,
        yes_no(seed.offloaded),
        seed.ctrl_flags,
        seed.timestamp_ns,
    );
    row
}

/// Files written by [`export_seeds`].
#[derive(Debug, Clone, Serialize)]
pub struct ExportSummary {
    pub dir: PathBuf,
    pub seed_files: Vec<PathBuf>,
    pub summary_csv: PathBuf,
    pub artifact_index: PathBuf,
}

/// Write `seeds` into `dir`, creating it if needed.
///
/// Each step is logged to `log` when one is given.
pub fn export_seeds(
    dir: &Path,
    run_id: &str,
    seeds: &[SeedRecord],
    mut log: Option<&mut LogEmitter>,
) -> Result<ExportSummary, HarnessError> {
    std::fs::create_dir_all(dir)?;

    let mut index = ArtifactIndex::new(run_id);
    let mut csv = String::from(CSV_HEADER);
    csv.push('\n');
    let mut seed_files = Vec::with_capacity(seeds.len());

    for (i, seed) in seeds.iter().enumerate() {
        let name = seed_file_name(i, seed.command);
        let bytes = SeedRecordWire::encode(seed);
        let path = dir.join(&name);
        std::fs::write(&path, &bytes)?;
        index.add(&name, "seed", &bytes);
        csv.push_str(&csv_row(i, seed));
        csv.push('\n');

        if let Some(log) = log.as_deref_mut() {
            let entry = log
                .entry(LogLevel::Debug, "seed_exported")
                .with_seed(seed.command, seed.sequence, seed.source.label())
                .with_outcome(Outcome::Ok)
                .with_artifacts(vec![name]);
            log.emit_entry(entry)?;
        }
        seed_files.push(path);
    }

    let summary_csv = dir.join(SUMMARY_FILE);
    std::fs::write(&summary_csv, csv.as_bytes())?;
    index.add(SUMMARY_FILE, "summary", csv.as_bytes());

    let artifact_index = dir.join(ARTIFACT_INDEX_FILE);
    std::fs::write(&artifact_index, index.to_json()?)?;

    if let Some(log) = log {
        let entry = log
            .entry(LogLevel::Info, "export_complete")
            .with_outcome(Outcome::Ok)
            .with_artifacts(vec![SUMMARY_FILE.to_string(), ARTIFACT_INDEX_FILE.to_string()])
            .with_details(serde_json::json!({
                "dir": dir.display().to_string(),
                "seeds": seeds.len(),
            }));
        log.emit_entry(entry)?;
    }

    Ok(ExportSummary {
        dir: dir.to_path_buf(),
        seed_files,
        summary_csv,
        artifact_index,
    })
}
