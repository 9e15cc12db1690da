// Logging collaborator interface
//
// The render core never owns the log pipeline. It writes
// (module, level, message) triples into a `LogSink`, which may be called
// from driver-owned threads (debug messenger callbacks).

use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};

/// Severity attached to every message the core emits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
    Debug,
}

impl LogLevel {
    fn as_log_level(self) -> log::Level {
        match self {
            LogLevel::Info => log::Level::Info,
            LogLevel::Warning => log::Level::Warn,
            LogLevel::Error => log::Level::Error,
            LogLevel::Debug => log::Level::Debug,
        }
    }
}

/// Subsystem a message originates from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleName {
    Core,
    Render,
    System,
    Application,
}

impl ModuleName {
    /// `log` target used when forwarding to the `log` facade
    pub fn target(self) -> &'static str {
        match self {
            ModuleName::Core => "core",
            ModuleName::Render => "render",
            ModuleName::System => "system",
            ModuleName::Application => "application",
        }
    }
}

impl fmt::Display for ModuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.target())
    }
}

/// Destination for diagnostics produced by the render core.
///
/// Implementations must not block the caller for long and must be callable
/// from any thread: the Vulkan debug messenger invokes its callback from
/// whatever thread the driver happens to be running on.
pub trait LogSink: Send + Sync {
    fn write_log(&self, module: ModuleName, level: LogLevel, message: &str);
}

/// Forwards everything to the `log` facade (and so to `env_logger`)
#[derive(Debug, Default, Clone, Copy)]
pub struct LogForwarder;

impl LogSink for LogForwarder {
    fn write_log(&self, module: ModuleName, level: LogLevel, message: &str) {
        log::log!(target: module.target(), level.as_log_level(), "{}", message);
    }
}

/// One captured log line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub module: ModuleName,
    pub level: LogLevel,
    pub message: String,
}

/// Sink that keeps every message in memory.
///
/// Handy for tools that want to show setup diagnostics after the fact, and
/// for asserting on what the core reported.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<LogRecord>>,
}

impl MemorySink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Copy of everything recorded so far
    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().clone()
    }

    /// Take and clear the recorded messages
    pub fn drain(&self) -> Vec<LogRecord> {
        std::mem::take(&mut *self.records.lock())
    }

    pub fn contains(&self, level: LogLevel, needle: &str) -> bool {
        self.records
            .lock()
            .iter()
            .any(|r| r.level == level && r.message.contains(needle))
    }
}

impl LogSink for MemorySink {
    fn write_log(&self, module: ModuleName, level: LogLevel, message: &str) {
        self.records.lock().push(LogRecord {
            module,
            level,
            message: message.to_owned(),
        });
    }
}

/// Weak handle to a sink, as held by the render core
pub fn downgrade<S: LogSink + 'static>(sink: &Arc<S>) -> Weak<dyn LogSink> {
    let weak: Weak<S> = Arc::downgrade(sink);
    weak
}

/// A sink handle that never upgrades; messages written through it are dropped
pub fn detached() -> Weak<dyn LogSink> {
    Weak::<LogForwarder>::new()
}

/// Write through a weak sink, silently dropping the message if it is gone
pub fn write_weak(sink: &Weak<dyn LogSink>, module: ModuleName, level: LogLevel, message: &str) {
    if let Some(sink) = sink.upgrade() {
        sink.write_log(module, level, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_sink_records_in_order() {
        let sink = MemorySink::new();
        sink.write_log(ModuleName::Core, LogLevel::Info, "first");
        sink.write_log(ModuleName::Render, LogLevel::Error, "second");

        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].message, "first");
        assert_eq!(records[1].module, ModuleName::Render);
        assert!(sink.contains(LogLevel::Error, "sec"));
        assert!(!sink.contains(LogLevel::Warning, "sec"));
    }

    #[test]
    fn drain_empties_the_sink() {
        let sink = MemorySink::new();
        sink.write_log(ModuleName::System, LogLevel::Debug, "x");
        assert_eq!(sink.drain().len(), 1);
        assert!(sink.records().is_empty());
    }

    #[test]
    fn weak_write_reaches_live_sink() {
        let sink = MemorySink::new();
        let weak = downgrade(&sink);
        write_weak(&weak, ModuleName::Core, LogLevel::Warning, "hello");
        assert!(sink.contains(LogLevel::Warning, "hello"));
    }

    #[test]
    fn weak_write_after_drop_is_ignored() {
        let sink = MemorySink::new();
        let weak = downgrade(&sink);
        drop(sink);
        write_weak(&weak, ModuleName::Core, LogLevel::Error, "lost");
        write_weak(&detached(), ModuleName::Core, LogLevel::Error, "lost too");
    }

    #[test]
    fn sink_is_usable_from_other_threads() {
        let sink = MemorySink::new();
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let weak = downgrade(&sink);
                std::thread::spawn(move || {
                    write_weak(&weak, ModuleName::Core, LogLevel::Debug, &format!("t{i}"));
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(sink.records().len(), 4);
    }

    #[test]
    fn module_targets() {
        assert_eq!(ModuleName::Core.target(), "core");
        assert_eq!(ModuleName::Application.to_string(), "application");
    }
}
