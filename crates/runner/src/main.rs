use anyhow::{Result, anyhow};
use documents::read_documents;
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info};
use rayon::prelude::*;
use regpush_core::config::read_config;
use regpush_core::logging::{init_file_logger, init_stderr_logger};
use regpush_core::recorder::Recorder;
use regpush_core::transport::http::HttpTransport;
use regpush_core::types::{Outcome, SubmissionRecord, unit_label};
use regpush_core::{Dispatcher, JsonEncoder, PendingResponse, RateGate, Response};
use std::fmt;
use std::sync::{Arc, mpsc};
use std::time::Instant;

/// A submit that has come back from the gate, admitted or not.
struct Submitted {
    doc_id: String,
    started: Instant,
    result: regpush_core::Result<PendingResponse>,
}

#[derive(Debug, Default)]
struct Tally {
    accepted: u64,
    rejected: u64,
    failed: u64,
}

impl Tally {
    fn count(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Accepted => self.accepted += 1,
            Outcome::Rejected => self.rejected += 1,
            _ => self.failed += 1,
        }
    }
}

impl fmt::Display for Tally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "accepted: {}, rejected: {}, failed: {}",
            self.accepted, self.rejected, self.failed
        )
    }
}

fn main() -> Result<()> {
    // CLI: runner [config.toml]
    let cfg_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "in/config.toml".into());
    let cfg = read_config(&cfg_path)?;

    // Logging
    if cfg.general.log_to_file {
        let path = init_file_logger(&cfg.io.out_dir, cfg.general.log_level)?;
        eprintln!("logging to {}", path.display());
    } else {
        init_stderr_logger(cfg.general.log_level)?;
    }

    let token = cfg.api.resolve_token()?;
    let docs = read_documents(&cfg.io.documents_file)?;
    if docs.is_empty() {
        return Err(anyhow!("no documents found in {}", cfg.io.documents_file));
    }

    let recorder = Recorder::open(&cfg.io.out_dir, &cfg.io.results_file_name)?;

    // Caller pool sizing; these threads are the ones the gate blocks
    let threads = if cfg.scheduler.concurrency == 0 {
        std::thread::available_parallelism()
            .map(|nz| nz.get())
            .unwrap_or(4)
    } else {
        cfg.scheduler.concurrency
    };

    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()?;

    let window = cfg.gate.window();
    match cfg.gate.window_ms {
        Some(_) => info!("gate: {} request(s) per {:?}", cfg.gate.limit, window),
        None => info!(
            "gate: {} request(s) per {}",
            cfg.gate.limit,
            unit_label(cfg.gate.window_unit)
        ),
    }
    let gate = Arc::new(RateGate::new(cfg.gate.limit, window)?);
    let transport = HttpTransport::new(cfg.api.timeout(), &cfg.api.user_agent)?;
    let dispatcher = Dispatcher::new(
        Arc::clone(&gate),
        transport,
        JsonEncoder,
        cfg.api.endpoint.as_str(),
        cfg.scheduler.io_threads,
    )?;

    // Progress bar
    let total = docs.len() as u64;
    let start = Instant::now();
    let pb = ProgressBar::new(total);
    pb.set_style(ProgressStyle::with_template(
        "{spinner:.green} {pos}/{len} [{bar:40.cyan/blue}] \
         {percent}% | {elapsed_precise} < {eta_precise} | {per_sec} | {msg}",
    )?);

    info!(
        "submitting {} document(s) to {} from {} caller thread(s)",
        total,
        dispatcher.endpoint(),
        threads
    );

    let (tx, rx) = mpsc::channel::<Submitted>();
    let tally = std::thread::scope(|s| {
        let (recorder, pb) = (&recorder, &pb);
        let drainer = s.spawn(move || drain(rx, recorder, pb));

        docs.par_iter().for_each_with(tx, |tx, doc| {
            let started = Instant::now();
            let result = dispatcher.submit(doc, &token);
            // the drainer only goes away if it panicked; join below reports that
            let _ = tx.send(Submitted {
                doc_id: doc.doc_id.clone(),
                started,
                result,
            });
        });

        drainer.join()
    })
    .map_err(|_| anyhow!("result drainer panicked"))?;

    recorder.flush()?;
    gate.shutdown();
    let stats = gate.stats();
    info!(
        "{} admission(s) over {} window(s); results in {}",
        stats.total_admitted,
        stats.window_index + 1,
        recorder.path().display()
    );

    pb.finish_with_message(format!(
        "done in {:.2}s, {}",
        start.elapsed().as_secs_f32(),
        tally
    ));

    Ok(())
}

/// Wait out each admitted request in arrival order and record its outcome.
fn drain(rx: mpsc::Receiver<Submitted>, recorder: &Recorder, pb: &ProgressBar) -> Tally {
    let mut tally = Tally::default();

    for sub in rx {
        let (window, result) = match sub.result {
            Ok(pending) => (Some(pending.admission().window), pending.wait()),
            Err(e) => (None, Err(e)),
        };
        let rec = to_record(sub.doc_id, window, sub.started, result);
        tally.count(rec.outcome);

        if let Some(e) = &rec.error {
            // avoid mangling the bar when printing errors
            pb.suspend(|| error!("[{}] {}", rec.doc_id, e));
        }
        if let Err(e) = recorder.write(&rec) {
            pb.suspend(|| error!("[{}] cannot record result: {e:#}", rec.doc_id));
        }

        pb.inc(1);
        pb.set_message(tally.to_string());
    }

    tally
}

fn to_record(
    doc_id: String,
    window: Option<u64>,
    started: Instant,
    result: regpush_core::Result<Response>,
) -> SubmissionRecord {
    let elapsed_ms = started.elapsed().as_millis();
    match result {
        Ok(resp) => SubmissionRecord {
            doc_id,
            outcome: if resp.is_success() {
                Outcome::Accepted
            } else {
                Outcome::Rejected
            },
            status: Some(resp.status),
            window,
            elapsed_ms,
            body: Some(resp.body),
            error: None,
        },
        Err(e) => SubmissionRecord {
            doc_id,
            outcome: Outcome::from_error(&e),
            status: None,
            window,
            elapsed_ms,
            body: None,
            error: Some(e.to_string()),
        },
    }
}
