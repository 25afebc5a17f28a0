//! Frameshare Kernel Macros
//!
//! Debug output for kernel code. `debug_print!` takes a level and a format
//! string and forwards to the `log` facade under the `kernel` target, so
//! whichever logger the kernel installs at boot (UART, ring buffer, test
//! capture) receives it. Records below the compiled-in `log` maximum level
//! cost nothing.

#![deny(missing_docs)]

/// Debug output levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum DebugLevel {
    /// Error messages - always shown
    Error = 0,
    /// Warning messages
    Warning = 1,
    /// Information messages
    Info = 2,
    /// Debug messages
    Debug = 3,
    /// Trace messages - most verbose
    Trace = 4,
}

impl DebugLevel {
    /// Alias used by `debug_print!(ERROR, ..)`
    pub const ERROR: Self = Self::Error;
    /// Alias used by `debug_print!(WARN, ..)`
    pub const WARN: Self = Self::Warning;
    /// Alias used by `debug_print!(INFO, ..)`
    pub const INFO: Self = Self::Info;
    /// Alias used by `debug_print!(DEBUG, ..)`
    pub const DEBUG: Self = Self::Debug;
    /// Alias used by `debug_print!(TRACE, ..)`
    pub const TRACE: Self = Self::Trace;

    /// Map onto the `log` crate's level
    pub const fn as_log_level(self) -> log::Level {
        match self {
            Self::Error => log::Level::Error,
            Self::Warning => log::Level::Warn,
            Self::Info => log::Level::Info,
            Self::Debug => log::Level::Debug,
            Self::Trace => log::Level::Trace,
        }
    }
}

/// Emit a kernel log record at the given level.
///
/// ```rust,ignore
/// debug_print!(DEBUG, "shm {} attached at {:?}", id, va);
/// ```
#[macro_export]
macro_rules! debug_print {
    ($level:ident, $($arg:tt)+) => {
        $crate::__log::log!(
            target: "kernel",
            $crate::macros::DebugLevel::$level.as_log_level(),
            $($arg)+
        )
    };
}

#[cfg(test)]
mod tests {
    use super::DebugLevel;

    #[test]
    fn levels_map_in_order() {
        assert_eq!(DebugLevel::ERROR.as_log_level(), log::Level::Error);
        assert_eq!(DebugLevel::WARN.as_log_level(), log::Level::Warn);
        assert_eq!(DebugLevel::TRACE.as_log_level(), log::Level::Trace);
        assert!(DebugLevel::Error < DebugLevel::Trace);
    }

    #[test]
    fn macro_accepts_format_arguments() {
        let handle = 3;
        debug_print!(INFO, "handle {} ready", handle);
        debug_print!(TRACE, "no arguments");
    }
}
