//! CLI entrypoint for seedhook operator tooling.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Serialize;

use seedhook_control::{ConfigWire, SeedRecordWire, StaticPrivilege};
use seedhook_engine::{HookConfig, HookFlags, HookStats, SeedHook, SeedRecord};
use seedhook_harness::structured_log::{LogEmitter, LogLevel, Outcome, validate_log_file};
use seedhook_harness::{
    ControlClient, ExportSummary, HarnessError, Monitor, MonitorPoll, WorkloadConfig,
    WorkloadReport, export_seeds, run_workload,
};

/// Seed capture tooling.
#[derive(Debug, Parser)]
#[command(name = "seedhook")]
#[command(about = "Drive, inspect and export seed captures")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a synthetic workload through the hooks and query the results.
    Run {
        /// Flag list (e.g. "enabled|record-seed|hook2"); overrides SEEDHOOK_FLAGS.
        #[arg(long)]
        flags: Option<String>,
        /// Ring capacity in records; overrides SEEDHOOK_CAPACITY.
        #[arg(long)]
        capacity: Option<u32>,
        /// Inline mutation probability (0-100); overrides SEEDHOOK_FUZZ_PROBABILITY.
        #[arg(long)]
        fuzz_probability: Option<u32>,
        #[arg(long, default_value_t = 4)]
        threads: usize,
        #[arg(long, default_value_t = 256)]
        calls: usize,
        /// Percent of calls on the local path.
        #[arg(long, default_value_t = 20)]
        local_percent: u32,
        /// Percent of calls issued below Hook 1.
        #[arg(long, default_value_t = 10)]
        internal_percent: u32,
        /// Workload PRNG seed.
        #[arg(long, default_value_t = 0x5EED_CAFE)]
        seed: u64,
        /// Directory to export captured seeds into.
        #[arg(long)]
        save_dir: Option<PathBuf>,
        /// Structured JSONL log path.
        #[arg(long)]
        log: Option<PathBuf>,
        /// Run identifier used in trace ids and the artifact index.
        #[arg(long, default_value = "seedhook-run")]
        run_id: String,
        /// Clear counters and seeds after extraction.
        #[arg(long)]
        clear: bool,
        /// Poll stats while the workload runs, collecting only new seeds.
        #[arg(long)]
        monitor: bool,
        /// Delay between monitor polls.
        #[arg(long, default_value_t = 50)]
        interval_ms: u64,
    },
    /// Decode an exported seed file and print it as JSON.
    Inspect {
        path: PathBuf,
    },
    /// Validate a structured JSONL log.
    ValidateLog {
        path: PathBuf,
    },
}

#[derive(Debug, Serialize)]
struct RunReport {
    config: HookConfig,
    workload: WorkloadReport,
    stats: HookStats,
    seeds_extracted: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    polls: Vec<MonitorPoll>,
    #[serde(skip_serializing_if = "Option::is_none")]
    export: Option<ExportSummary>,
}

#[derive(Debug, Serialize)]
struct SeedView {
    sequence: u64,
    source: &'static str,
    serialized: bool,
    client: String,
    object: String,
    command: String,
    ctrl_flags: String,
    access_right: String,
    gpu_instance: u32,
    offloaded: bool,
    timestamp_ns: u64,
    response_status: String,
    latency_us: u64,
    params: String,
    response: String,
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Run the workload on a background thread, polling every `interval` until
/// it finishes, then once more to pick up the tail.
fn monitor_workload(
    hook: &Arc<SeedHook>,
    client: &mut ControlClient,
    workload: WorkloadConfig,
    interval: Duration,
) -> Result<(WorkloadReport, Vec<MonitorPoll>, Vec<SeedRecord>), HarnessError> {
    let worker = {
        let hook = Arc::clone(hook);
        thread::spawn(move || run_workload(&hook, workload))
    };

    let mut monitor = Monitor::new();
    let mut polls = Vec::new();
    while !worker.is_finished() {
        thread::sleep(interval);
        polls.push(monitor.poll(client)?);
    }
    let report = worker.join().map_err(|_| HarnessError::WorkerPanic)??;
    polls.push(monitor.poll(client)?);
    Ok((report, polls, monitor.into_seeds()))
}

#[allow(clippy::too_many_arguments)]
fn run(
    flags: Option<String>,
    capacity: Option<u32>,
    fuzz_probability: Option<u32>,
    workload: WorkloadConfig,
    save_dir: Option<PathBuf>,
    log: Option<PathBuf>,
    run_id: &str,
    clear: bool,
    monitor: Option<Duration>,
) -> Result<(), HarnessError> {
    let mut config = HookConfig::from_env();
    if let Some(flags) = flags {
        config.flags = HookFlags::from_str_loose(&flags);
    }
    if let Some(capacity) = capacity {
        config.capacity = capacity;
    }
    if let Some(p) = fuzz_probability {
        config.mutation_probability = p;
    }

    let hook = Arc::new(SeedHook::with_config(config));
    hook.init()?;

    let mut client = ControlClient::new(Arc::clone(&hook), StaticPrivilege::ADMIN);
    if let Some(path) = &log {
        let mut emitter = LogEmitter::to_file(path, run_id, "run")?;
        let entry = emitter
            .entry(LogLevel::Info, "run_start")
            .with_details(serde_json::json!({
                "flags": config.flags.bits(),
                "capacity": config.capacity,
                "mutation_probability": config.mutation_probability,
                "workload": workload,
            }));
        emitter.emit_entry(entry)?;
        client = client.with_log(emitter);
    }

    let (report, polls, monitored) = match monitor {
        Some(interval) => {
            let (report, polls, seeds) = monitor_workload(&hook, &mut client, workload, interval)?;
            (report, polls, Some(seeds))
        }
        None => (run_workload(&hook, workload)?, Vec::new(), None),
    };
    if let Some(log) = client.log_mut() {
        let entry = log
            .entry(LogLevel::Info, "workload_complete")
            .with_outcome(Outcome::Ok)
            .with_details(serde_json::to_value(report)?);
        log.emit_entry(entry)?;
    }

    let wire: ConfigWire = client.get_config()?;
    let stats = client.get_stats()?;
    let seeds = match monitored {
        Some(seeds) => seeds,
        None => client.fetch_all()?,
    };

    let export = match &save_dir {
        Some(dir) => Some(export_seeds(dir, run_id, &seeds, client.log_mut())?),
        None => None,
    };
    if clear {
        client.clear_stats()?;
    }
    client.into_log()?;
    hook.cleanup();

    let out = RunReport {
        config: wire.to_config(),
        workload: report,
        stats,
        seeds_extracted: seeds.len(),
        polls,
        export,
    };
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn inspect(path: &Path) -> Result<(), HarnessError> {
    let bytes = std::fs::read(path)?;
    let seed = SeedRecordWire::decode(&bytes)?;
    let view = SeedView {
        sequence: seed.sequence,
        source: seed.source.label(),
        serialized: seed.serialized,
        client: format!("0x{:08X}", seed.client),
        object: format!("0x{:08X}", seed.object),
        command: format!("0x{:08X}", seed.command),
        ctrl_flags: format!("0x{:08X}", seed.ctrl_flags),
        access_right: format!("0x{:08X}", seed.access_right),
        gpu_instance: seed.gpu_instance,
        offloaded: seed.offloaded,
        timestamp_ns: seed.timestamp_ns,
        response_status: format!("0x{:08X}", seed.response_status),
        latency_us: seed.latency_us,
        params: hex(seed.params.as_slice()),
        response: hex(seed.response.as_slice()),
    };
    println!("{}", serde_json::to_string_pretty(&view)?);
    Ok(())
}

fn validate_log(path: &Path) -> Result<bool, HarnessError> {
    let (lines, errors) = validate_log_file(path)?;
    for err in &errors {
        eprintln!("{err}");
    }
    println!(
        "{}: {lines} lines, {} errors",
        path.display(),
        errors.len()
    );
    Ok(errors.is_empty())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let result = match cli.command {
        Command::Run {
            flags,
            capacity,
            fuzz_probability,
            threads,
            calls,
            local_percent,
            internal_percent,
            seed,
            save_dir,
            log,
            run_id,
            clear,
            monitor,
            interval_ms,
        } => {
            let workload = WorkloadConfig {
                threads,
                calls_per_thread: calls,
                local_percent,
                internal_percent,
                seed,
            };
            run(
                flags,
                capacity,
                fuzz_probability,
                workload,
                save_dir,
                log,
                &run_id,
                clear,
                monitor.then(|| Duration::from_millis(interval_ms)),
            )
            .map(|()| true)
        }
        Command::Inspect { path } => inspect(&path).map(|()| true),
        Command::ValidateLog { path } => validate_log(&path),
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("seedhook: {err}");
            ExitCode::from(u8::try_from(err.exit_code()).unwrap_or(1))
        }
    }
}
