//! Log backend for platforms that do not install a [log::Log] implementation of their own.
//!
//! Records are coloured by level and prefixed with the driver name, then handed to a [LogSink]
//! line by line.

use core::fmt::Arguments;
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError, set_logger, set_max_level};
use spin::Once;

use crate::config::CHRDEV_NAME;

/// Where formatted log lines end up, usually a serial console.
pub trait LogSink: Send + Sync {
    fn write_line(&self, args: Arguments);
}

pub struct Logger {
    sink: &'static dyn LogSink,
    prefix: &'static str,
    level: LevelFilter,
}

impl Logger {
    pub const fn new(sink: &'static dyn LogSink, prefix: &'static str, level: LevelFilter) -> Self {
        Self {
            sink,
            prefix,
            level,
        }
    }
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let color = match record.level() {
            Level::Error => 31, // Red
            Level::Warn => 93,  // BrightYellow
            Level::Info => 37,  // White
            Level::Debug => 32, // Green
            Level::Trace => 90, // BrightBlack
        };
        self.sink.write_line(format_args!(
            "\u{1B}[{}m{}: [{}] {}\u{1B}[0m",
            color,
            self.prefix,
            record.level(),
            record.args(),
        ));
    }

    fn flush(&self) {}
}

static LOGGER: Once<Logger> = Once::new();

/// Install the driver logger once. Fail if any logger, this one included, is already installed.
pub fn init(sink: &'static dyn LogSink, level: LevelFilter) -> Result<(), SetLoggerError> {
    let logger = LOGGER.call_once(|| Logger::new(sink, CHRDEV_NAME, level));
    set_logger(logger)?;
    set_max_level(level);
    Ok(())
}

/// Improved debug macro,
/// only compiled in debug mode.
#[macro_export]
macro_rules! debug_ex {
    // debug_ex!(target: "my_target", "a {} event", "log")
    (target: $target:expr, $($arg:tt)+) => {
        #[cfg(debug_assertions)]
        {
            use log::{log,Level};
            log!(target: $target, Level::Debug, $($arg)+)
        }
    };

    // debug_ex!("a {} event", "log")
    ($($arg:tt)+) => {
        #[cfg(debug_assertions)]
        {
            use log::{log,Level};
            log!(Level::Debug, $($arg)+)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::{string::String, vec::Vec};
    use spin::Mutex;

    struct CaptureSink {
        lines: Mutex<Vec<String>>,
    }

    impl LogSink for CaptureSink {
        fn write_line(&self, args: Arguments) {
            self.lines.lock().push(alloc::format!("{}", args));
        }
    }

    #[test]
    fn records_are_prefixed_and_filtered() {
        static SINK: CaptureSink = CaptureSink {
            lines: Mutex::new(Vec::new()),
        };
        let logger = Logger::new(&SINK, "axidma", LevelFilter::Info);
        logger.log(
            &Record::builder()
                .args(format_args!("DMA: Found {} transmit channels.", 1))
                .level(Level::Error)
                .build(),
        );
        logger.log(
            &Record::builder()
                .args(format_args!("dropped"))
                .level(Level::Debug)
                .build(),
        );
        let lines = SINK.lines.lock();
        assert_eq!(
            *lines,
            ["\u{1B}[31maxidma: [ERROR] DMA: Found 1 transmit channels.\u{1B}[0m"]
        );
    }

    #[test]
    fn init_installs_once() {
        static SINK: CaptureSink = CaptureSink {
            lines: Mutex::new(Vec::new()),
        };
        assert!(init(&SINK, LevelFilter::Warn).is_ok());
        assert!(init(&SINK, LevelFilter::Warn).is_err());
        log::warn!("installed");
        assert!(
            SINK.lines
                .lock()
                .iter()
                .any(|line| line.contains("axidma: [WARN] installed"))
        );
    }
}
