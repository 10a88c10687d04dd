use std::fs::create_dir_all;
use std::io::Write;
use std::path::PathBuf;

use env_logger::{Builder, Target};

use crate::rotate::RotatingWriter;

/// Hard cap for the active log file before rolling to a new numbered file.
const MAX_LOG_BYTES: u64 = 64 * 1024 * 1024; // 64 MiB
const BASE_NAME: &str = "regpush.log";

fn builder(level: log::LevelFilter) -> Builder {
    let mut b = Builder::new();
    b.format(|buf, record| {
        let ts = chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f");
        writeln!(
            buf,
            "[{}] {} {}: {}",
            ts,
            record.level(),
            record.target(),
            record.args()
        )
    });
    b.filter_level(level);

    if let Ok(spec) = std::env::var("RUST_LOG") {
        b.parse_filters(&spec);
    } else {
        // reqwest/hyper connection chatter is rarely useful here
        b.parse_filters("reqwest=warn,hyper=warn,rustls=warn");
    }
    b
}

/// Log to stderr.
pub fn init_stderr_logger(level: log::LevelFilter) -> anyhow::Result<()> {
    builder(level).target(Target::Stderr).try_init()?;
    Ok(())
}

/// Log only to <out_dir>/log_files/regpush.log, rolling over to numbered files.
/// Returns the active log path.
pub fn init_file_logger(out_dir: &str, level: log::LevelFilter) -> anyhow::Result<PathBuf> {
    let dir = PathBuf::from(out_dir).join("log_files");
    create_dir_all(&dir)?;

    let writer = RotatingWriter::new(&dir, BASE_NAME, MAX_LOG_BYTES)?;
    let log_path = writer.path();

    builder(level)
        .target(Target::Pipe(Box::new(writer)))
        .try_init()?;

    Ok(log_path)
}
