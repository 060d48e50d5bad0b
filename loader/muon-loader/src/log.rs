//! Loader logging facade.
//!
//! The loader logs through a pair of registered function pointers with
//! no locks and no allocation: [`set_print_fn`] installs the raw print
//! path used by [`lprint!`] / [`lprintln!`], and [`set_log_fn`] installs
//! the leveled path used by [`llog!`] and the per-level macros. The
//! console and serial drivers that actually emit bytes live outside
//! this crate and register themselves here during early boot; until
//! they do, logging is a no-op.

use core::fmt;
use core::sync::atomic::{AtomicPtr, Ordering};

/// Loader log severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    /// Fatal: unrecoverable error, the loader will halt.
    Fatal = 0,
    /// Error: a discovery step failed but boot may continue.
    Error = 1,
    /// Warning: unexpected condition, not necessarily an error.
    Warn = 2,
    /// Informational: high-level progress messages.
    Info = 3,
    /// Debug: detailed diagnostic information.
    Debug = 4,
    /// Trace: very verbose, low-level tracing.
    Trace = 5,
}

impl LogLevel {
    /// Returns the human-readable name (fixed-width for aligned output).
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Fatal => "FATAL",
            Self::Error => "ERROR",
            Self::Warn => "WARN ",
            Self::Info => "INFO ",
            Self::Debug => "DEBUG",
            Self::Trace => "TRACE",
        }
    }
}

/// The signature of the global print function.
pub type PrintFn = fn(fmt::Arguments<'_>);

/// The signature of the global leveled log function.
pub type LogFn = fn(LogLevel, fmt::Arguments<'_>);

fn null_print(_args: fmt::Arguments<'_>) {}

fn null_log(_level: LogLevel, _args: fmt::Arguments<'_>) {}

static PRINT_FN: AtomicPtr<()> = AtomicPtr::new(null_print as *mut ());

static LOG_FN: AtomicPtr<()> = AtomicPtr::new(null_log as *mut ());

/// Registers the global print function.
///
/// # Safety
///
/// The provided function must be safe to call from any loader context.
/// Uses `Release` ordering so subsequent loads see the new function.
pub unsafe fn set_print_fn(f: PrintFn) {
    PRINT_FN.store(f as *mut (), Ordering::Release);
}

/// Registers the global leveled log function.
///
/// # Safety
///
/// Same requirements as [`set_print_fn`].
pub unsafe fn set_log_fn(f: LogFn) {
    LOG_FN.store(f as *mut (), Ordering::Release);
}

/// Implementation detail for [`lprint!`] / [`lprintln!`]. Not public API.
#[doc(hidden)]
pub fn _print(args: fmt::Arguments<'_>) {
    let ptr = PRINT_FN.load(Ordering::Acquire);
    // SAFETY: only valid `PrintFn` pointers are ever stored in PRINT_FN.
    let f: PrintFn = unsafe { core::mem::transmute(ptr) };
    f(args);
}

/// Implementation detail for [`llog!`]. Not public API.
#[doc(hidden)]
pub fn _log(level: LogLevel, args: fmt::Arguments<'_>) {
    let ptr = LOG_FN.load(Ordering::Acquire);
    // SAFETY: only valid `LogFn` pointers are ever stored in LOG_FN.
    let f: LogFn = unsafe { core::mem::transmute(ptr) };
    f(level, args);
}

/// Prints to the registered sink (raw, no level).
#[macro_export]
macro_rules! lprint {
    ($($arg:tt)*) => { $crate::log::_print(format_args!($($arg)*)) };
}

/// Prints to the registered sink with a trailing newline (raw, no level).
#[macro_export]
macro_rules! lprintln {
    () => { $crate::lprint!("\n") };
    ($($arg:tt)*) => { $crate::lprint!("{}\n", format_args!($($arg)*)) };
}

/// Logs a message at the given level.
#[macro_export]
macro_rules! llog {
    ($level:expr, $($arg:tt)*) => {
        $crate::log::_log($level, format_args!($($arg)*))
    };
}

/// Logs a fatal-level message.
#[macro_export]
macro_rules! lfatal {
    ($($arg:tt)*) => { $crate::llog!($crate::log::LogLevel::Fatal, $($arg)*) };
}

/// Logs an error-level message.
#[macro_export]
macro_rules! lerr {
    ($($arg:tt)*) => { $crate::llog!($crate::log::LogLevel::Error, $($arg)*) };
}

/// Logs a warning-level message.
#[macro_export]
macro_rules! lwarn {
    ($($arg:tt)*) => { $crate::llog!($crate::log::LogLevel::Warn, $($arg)*) };
}

/// Logs an info-level message.
#[macro_export]
macro_rules! linfo {
    ($($arg:tt)*) => { $crate::llog!($crate::log::LogLevel::Info, $($arg)*) };
}

/// Logs a debug-level message.
#[macro_export]
macro_rules! ldebug {
    ($($arg:tt)*) => { $crate::llog!($crate::log::LogLevel::Debug, $($arg)*) };
}

/// Logs a trace-level message.
#[macro_export]
macro_rules! ltrace {
    ($($arg:tt)*) => { $crate::llog!($crate::log::LogLevel::Trace, $($arg)*) };
}
