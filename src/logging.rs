use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;

static LOGGER: OnceLock<Logger> = OnceLock::new();

pub fn init_log_file(path: &Path) -> Result<()> {
    init_with_sink(path, Box::new(InternalLogSink))
}

pub fn init_default_log_file() -> Result<PathBuf> {
    let path = crate::config::Config::default_log_file_path();
    init_log_file(&path)?;
    Ok(path)
}

fn init_with_sink(path: &Path, sink: Box<dyn LogSink>) -> Result<()> {
    if LOGGER.get().is_some() {
        return Ok(());
    }
    let logger = Logger::open(path, sink)?;
    let _ = LOGGER.set(logger);
    Ok(())
}

/// One emitted log line's event data, serialized as a JSON object per line
/// in the log file (§10 "structured ... line to a log file per event").
#[derive(Serialize)]
struct Event<'a> {
    ts: String,
    level: &'a str,
    msg: &'a str,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    fields: BTreeMap<&'a str, &'a str>,
}

/// External collaborator for human-facing log output: a single `log(line)`
/// call whose destination is owned by the embedder rather than the engine
/// (§1 "Log sink (a single `log(string)` call; formatting and destination
/// are external)"). The engine's own JSON event file is written regardless
/// of which sink is installed.
pub trait LogSink: Send + Sync {
    fn log(&self, line: &str);
}

/// Default sink: prints the rendered line to stdout.
pub struct InternalLogSink;

impl LogSink for InternalLogSink {
    fn log(&self, line: &str) {
        let mut out = std::io::stdout();
        let _ = writeln!(out, "{line}");
        let _ = out.flush();
    }
}

pub fn info(msg: impl AsRef<str>) {
    emit("info", msg.as_ref(), &[]);
}

pub fn error(msg: impl AsRef<str>) {
    emit("error", msg.as_ref(), &[]);
}

pub fn info_kv(msg: &str, kv: &[(&str, &str)]) {
    emit("info", msg, kv);
}

fn emit(level: &str, msg: &str, kv: &[(&str, &str)]) {
    if let Some(logger) = LOGGER.get() {
        logger.emit(level, msg, kv);
    }
}

struct Logger {
    file: Mutex<File>,
    sink: Box<dyn LogSink>,
}

impl Logger {
    fn open(path: &Path, sink: Box<dyn LogSink>) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(path)
            .with_context(|| format!("open {}", path.display()))?;
        Ok(Self {
            file: Mutex::new(file),
            sink,
        })
    }

    fn emit(&self, level: &str, msg: &str, kv: &[(&str, &str)]) {
        let ts = Utc::now().to_rfc3339();
        let event = Event {
            ts: ts.clone(),
            level,
            msg,
            fields: kv.iter().copied().collect(),
        };

        if let Ok(line) = serde_json::to_string(&event) {
            if let Ok(mut f) = self.file.lock() {
                let _ = writeln!(f, "{line}");
                let _ = f.flush();
            }
        }

        self.sink.log(&render_human_line(&ts, level, msg, kv));
    }
}

fn render_human_line(ts: &str, level: &str, msg: &str, kv: &[(&str, &str)]) -> String {
    let mut line = format!("[{ts}] {} {msg}", level.to_uppercase());
    for (k, v) in kv {
        line.push_str(&format!(" {k}={v}"));
    }
    line
}
