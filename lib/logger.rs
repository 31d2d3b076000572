use log::{Log, Metadata, Record};
use once_cell::sync::Lazy;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::sync::Mutex;

enum Sink {
    Stderr,
    File(File),
}

pub struct Logger {
    sinks: Mutex<Vec<Sink>>,
}

static G_LOGGER: Lazy<Logger> = Lazy::new(|| Logger {
    sinks: Mutex::new(Vec::new()),
});

impl Logger {
    /// install the process wide logger, calling it twice is harmless
    pub fn init() -> &'static Logger {
        let logger: &'static Logger = &G_LOGGER;
        if log::set_logger(logger).is_err() {
            log::debug!("logger already installed");
        }
        logger
    }

    pub fn add_file(&self, path: &str, trunc: bool) -> &Self {
        let mut opt = OpenOptions::new();
        opt.create(true);
        if trunc {
            opt.write(true).truncate(true);
        } else {
            opt.append(true);
        }
        match opt.open(path) {
            Ok(f) => self.push(Sink::File(f)),
            Err(e) => eprintln!("can't open log file {} error {}", path, e),
        }
        self
    }

    pub fn add_stderr(&self) -> &Self {
        self.push(Sink::Stderr);
        self
    }

    fn push(&self, sink: Sink) {
        if let Ok(mut sinks) = self.sinks.lock() {
            sinks.push(sink);
        }
    }
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format!(
            "{} {:<5} [{}:{}] {}\n",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            record.level(),
            record.module_path().unwrap_or("?"),
            record.line().unwrap_or(0),
            record.args()
        );
        let Ok(mut sinks) = self.sinks.lock() else {
            return;
        };
        for s in sinks.iter_mut() {
            let _ = match s {
                Sink::Stderr => std::io::stderr().write_all(line.as_bytes()),
                Sink::File(f) => f.write_all(line.as_bytes()),
            };
        }
    }

    fn flush(&self) {
        if let Ok(mut sinks) = self.sinks.lock() {
            for s in sinks.iter_mut() {
                if let Sink::File(f) = s {
                    let _ = f.flush();
                }
            }
        }
    }
}
