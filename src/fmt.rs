//! Logging shims.
//!
//! The crate logs through these macros so the backend can be picked with a
//! feature flag: `log` forwards to the `log` facade, `esp32-log` prints over
//! `esp-println`. With neither enabled the arguments are still type-checked
//! but nothing is emitted.
#![allow(unused_macros)]

macro_rules! trace {
    ($($arg:tt)*) => {{
        #[cfg(feature = "log")]
        ::log::trace!($($arg)*);
        #[cfg(not(feature = "log"))]
        {
            let _ = ::core::format_args!($($arg)*);
        }
    }};
}

macro_rules! debug {
    ($($arg:tt)*) => {{
        #[cfg(feature = "log")]
        ::log::debug!($($arg)*);
        #[cfg(not(feature = "log"))]
        {
            let _ = ::core::format_args!($($arg)*);
        }
    }};
}

macro_rules! info {
    ($($arg:tt)*) => {{
        #[cfg(feature = "log")]
        ::log::info!($($arg)*);
        #[cfg(feature = "esp32-log")]
        ::esp_println::println!($($arg)*);
        #[cfg(not(any(feature = "log", feature = "esp32-log")))]
        {
            let _ = ::core::format_args!($($arg)*);
        }
    }};
}

macro_rules! warn {
    ($($arg:tt)*) => {{
        #[cfg(feature = "log")]
        ::log::warn!($($arg)*);
        #[cfg(feature = "esp32-log")]
        ::esp_println::println!($($arg)*);
        #[cfg(not(any(feature = "log", feature = "esp32-log")))]
        {
            let _ = ::core::format_args!($($arg)*);
        }
    }};
}

macro_rules! error {
    ($($arg:tt)*) => {{
        #[cfg(feature = "log")]
        ::log::error!($($arg)*);
        #[cfg(feature = "esp32-log")]
        ::esp_println::println!($($arg)*);
        #[cfg(not(any(feature = "log", feature = "esp32-log")))]
        {
            let _ = ::core::format_args!($($arg)*);
        }
    }};
}
