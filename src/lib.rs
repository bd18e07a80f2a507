pub mod nav;

// ============================================================================
// Profiling Macros
// ============================================================================

/// Log a message every 100 ticks when the `perf_stats` feature is enabled.
///
/// `$clock` is anything with a `tick: u64` field, usually `Res<TickClock>`.
/// Without `perf_stats` the macro expands to nothing and its arguments are
/// never evaluated.
///
/// ```ignore
/// profile_log!(clock, "[MOVEMENT] {} swarm fields cached", fields.len());
/// ```
#[macro_export]
#[cfg(feature = "perf_stats")]
macro_rules! profile_log {
    ($clock:expr, $($arg:tt)*) => {
        if $clock.tick % 100 == 0 {
            bevy::prelude::info!($($arg)*);
        }
    };
}

#[macro_export]
#[cfg(not(feature = "perf_stats"))]
macro_rules! profile_log {
    ($clock:expr, $($arg:tt)*) => {};
}
