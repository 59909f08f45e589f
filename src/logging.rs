// ~/shutdown-alert/src/logging.rs

use std::{
    fmt::Display,
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Sender},
        Mutex, OnceLock,
    },
    thread::{self, JoinHandle},
};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/* =========================
   GLOBAL STATE
   ========================= */

static ENABLED: AtomicBool = AtomicBool::new(false);
static STARTED: AtomicBool = AtomicBool::new(false);
static WRITER: Mutex<Option<LogWriter>> = Mutex::new(None);
static ERROR_LOG_PATH: OnceLock<PathBuf> = OnceLock::new();

/// Oldest entries are dropped once the structured error log grows past this.
pub const MAX_ERROR_ENTRIES: usize = 100;

/* =========================
   PUBLIC API
   ========================= */

/// Starts the background writer for `log_path` and remembers where structured
/// error entries go. Only the first call has any effect.
pub fn init(debug: bool, log_path: PathBuf, error_log_path: PathBuf) {
    ENABLED.store(debug, Ordering::Relaxed);

    if STARTED.swap(true, Ordering::SeqCst) {
        return;
    }
    let _ = ERROR_LOG_PATH.set(error_log_path);

    if let Ok(mut writer) = WRITER.lock() {
        *writer = Some(LogWriter::spawn(log_path));
    }
}

/// Turns INFO lines on once settings loaded after `init` ask for them.
pub fn raise_to_debug() {
    ENABLED.store(true, Ordering::Relaxed);
}

/// Writes out everything queued so far and stops the writer. Later lines are dropped.
pub fn shutdown() {
    let writer = WRITER.lock().ok().and_then(|mut w| w.take());
    if let Some(writer) = writer {
        writer.finish();
    }
}

#[inline]
pub fn enabled() -> bool {
    ENABLED.load(Ordering::Relaxed)
}

/// Appends one entry to the structured error log and mirrors it to the text log.
/// Never fails: the error log is diagnostics, not application state.
pub fn record_error(component: &str, message: &str, err: Option<&dyn Display>, context: Option<Value>) {
    let entry = ErrorEntry::new(component, message, err, context);
    enqueue(
        "ERROR",
        match &entry.error {
            Some(e) => format!("[{component}] {message}: {e}"),
            None => format!("[{component}] {message}"),
        },
    );

    if let Some(path) = ERROR_LOG_PATH.get() {
        append_error_entry(path, entry);
    }
}

/* =========================
   INTERNAL
   ========================= */

#[inline]
pub fn enqueue(level: &str, msg: String) {
    if let Ok(writer) = WRITER.lock() {
        if let Some(writer) = writer.as_ref() {
            writer.send(format!("{} [{level}] {msg}", timestamp()));
        }
    }
}

/// Appends lines to one file from a dedicated thread.
struct LogWriter {
    tx: Sender<String>,
    handle: JoinHandle<()>,
}

impl LogWriter {
    fn spawn(log_path: PathBuf) -> Self {
        let (tx, rx) = mpsc::channel::<String>();

        let handle = thread::spawn(move || {
            let mut file = match OpenOptions::new().create(true).append(true).open(&log_path) {
                Ok(file) => file,
                Err(_) => return,
            };

            while let Ok(line) = rx.recv() {
                let _ = writeln!(file, "{line}");
                let _ = file.flush();
            }
        });

        Self { tx, handle }
    }

    fn send(&self, line: String) {
        let _ = self.tx.send(line);
    }

    /// Closes the channel and waits until the thread has drained it.
    fn finish(self) {
        drop(self.tx);
        let _ = self.handle.join();
    }
}

fn timestamp() -> String {
    let now = chrono::Local::now();
    now.format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}

/* =========================
   STRUCTURED ERROR LOG
   ========================= */

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub timestamp: String,
    pub level: String,
    pub component: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
}

impl ErrorEntry {
    fn new(component: &str, message: &str, err: Option<&dyn Display>, context: Option<Value>) -> Self {
        Self {
            timestamp: chrono::Local::now().to_rfc3339(),
            level: "ERROR".to_string(),
            component: component.to_string(),
            message: message.to_string(),
            error: err.map(|e| e.to_string()),
            context,
        }
    }
}

fn read_error_entries(path: &Path) -> Vec<ErrorEntry> {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|text| serde_json::from_str(&text).ok())
        .unwrap_or_default()
}

fn append_error_entry(path: &Path, entry: ErrorEntry) {
    let mut entries = read_error_entries(path);
    entries.push(entry);

    if entries.len() > MAX_ERROR_ENTRIES {
        let excess = entries.len() - MAX_ERROR_ENTRIES;
        entries.drain(..excess);
    }

    if let Ok(text) = serde_json::to_string_pretty(&entries) {
        let _ = std::fs::write(path, text);
    }
}

/* =========================
   MACROS
   ========================= */

#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {{
        if $crate::logging::enabled() {
            $crate::logging::enqueue(
                "INFO",
                format!($($arg)*)
            );
        }
    }};
}

#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {{
        $crate::logging::enqueue(
            "WARN",
            format!($($arg)*)
        );
    }};
}

#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {{
        $crate::logging::enqueue(
            "ERROR",
            format!($($arg)*)
        );
    }};
}
