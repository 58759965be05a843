use std::io::{self, Write};

use anstyle::{AnsiColor, Reset};
use klocks::Once;
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError};

/// a simple logger
struct SimpleLogger {
    clog: LevelFilter,
}

impl Log for SimpleLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        self.clog >= metadata.level()
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        // 日志写不出去也没有别的地方可以报告了，直接忽略
        let _ = write_log(&mut io::stderr().lock(), record.level(), record.args());
    }

    fn flush(&self) {
        let _ = io::stderr().flush();
    }
}

fn write_log(
    writer: &mut impl Write,
    level: Level,
    args: &core::fmt::Arguments<'_>,
) -> io::Result<()> {
    // 开头部分，即日志级别，如 `[ INFO]`
    let color = match level {
        Level::Error => AnsiColor::Red,
        Level::Warn => AnsiColor::BrightYellow,
        Level::Info => AnsiColor::Blue,
        Level::Debug => AnsiColor::Green,
        Level::Trace => AnsiColor::BrightBlack,
    };
    writeln!(
        writer,
        "{}[{:>5}]{} {}",
        color.render_fg(),
        level,
        Reset.render(),
        args
    )
}

/// 编译期通过 `RAMBLK_CLOG` 环境变量决定的默认日志级别
pub const DEFAULT_LEVEL: LevelFilter = decide_log_level(option_env!("RAMBLK_CLOG"));

const fn decide_log_level(level_str: Option<&str>) -> LevelFilter {
    const fn str_eq(lhs: &str, rhs: &str) -> bool {
        let lhs = lhs.as_bytes();
        let rhs = rhs.as_bytes();

        if lhs.len() != rhs.len() {
            return false;
        }
        let mut i = 0;
        while i < lhs.len() {
            if lhs[i] != rhs[i] {
                return false;
            }
            i += 1;
        }
        true
    }

    if let Some(level_str) = level_str {
        if str_eq(level_str, "TRACE") {
            LevelFilter::Trace
        } else if str_eq(level_str, "DEBUG") {
            LevelFilter::Debug
        } else if str_eq(level_str, "INFO") {
            LevelFilter::Info
        } else if str_eq(level_str, "WARN") {
            LevelFilter::Warn
        } else if str_eq(level_str, "ERROR") {
            LevelFilter::Error
        } else {
            LevelFilter::Off
        }
    } else {
        LevelFilter::Off
    }
}

static LOGGER: Once<SimpleLogger> = Once::new();

/// initiate logger with [`DEFAULT_LEVEL`]
pub fn init() -> Result<(), SetLoggerError> {
    init_with_level(DEFAULT_LEVEL)
}

/// 只有第一次调用会生效，之后的调用返回 `Err`
pub fn init_with_level(clog: LevelFilter) -> Result<(), SetLoggerError> {
    let logger = LOGGER.call_once(|| SimpleLogger { clog });
    log::set_logger(logger)?;
    log::set_max_level(logger.clog);
    Ok(())
}

#[cfg(test)]
mod tests {
    use log::{Level, LevelFilter};

    use super::{decide_log_level, write_log};

    #[test]
    fn level_from_env_string() {
        assert_eq!(decide_log_level(Some("TRACE")), LevelFilter::Trace);
        assert_eq!(decide_log_level(Some("WARN")), LevelFilter::Warn);
        assert_eq!(decide_log_level(Some("warn")), LevelFilter::Off);
        assert_eq!(decide_log_level(Some("")), LevelFilter::Off);
        assert_eq!(decide_log_level(None), LevelFilter::Off);
    }

    #[test]
    fn line_format() {
        let mut out = Vec::new();
        write_log(&mut out, Level::Info, &format_args!("disk {} ready", 0)).unwrap();
        let line = String::from_utf8(out).unwrap();
        assert!(line.contains("[ INFO]"));
        assert!(line.ends_with(" disk 0 ready\n"));
    }
}
