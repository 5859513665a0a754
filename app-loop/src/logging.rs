//! Logging setup
//!
//! The crates in this workspace log through `tracing`. With the `subscriber`
//! feature these helpers install a `tracing-subscriber` formatter; without it
//! they only warn on stderr. Installing twice is harmless: the second call
//! keeps the first subscriber.

#[cfg(feature = "subscriber")]
use tracing::debug;

/// Initialize a subscriber with sensible defaults for runner applications
#[cfg(feature = "subscriber")]
pub fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        // Default filter: info+ for the runner crates, warn+ for everything else
        "app_loop=info,app_loop_sdl3=info,app_loop_demos=info,warn".into()
    });

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}

/// Initialize a subscriber with a custom filter directive
#[cfg(feature = "subscriber")]
pub fn init_tracing_with_filter(filter: &str) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::new(filter);

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}

/// Initialize a verbose subscriber for development
///
/// Shows lifecycle transitions and per-callback traces of the runner.
#[cfg(feature = "subscriber")]
pub fn init_tracing_dev() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "app_loop=trace,app_loop_sdl3=trace,app_loop_demos=debug,info".into()
    });

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .try_init();
}

/// Log frame statistics
#[cfg(feature = "subscriber")]
pub fn log_frame_stats(frame_time: f32, fps: f32) {
    let frame_ms = frame_time * 1000.0;
    debug!(frame_ms, fps, "frame stats");
}

#[cfg(not(feature = "subscriber"))]
pub fn init_tracing() {
    eprintln!("Warning: subscriber feature not enabled, logging disabled");
}

#[cfg(not(feature = "subscriber"))]
pub fn init_tracing_with_filter(_filter: &str) {
    eprintln!("Warning: subscriber feature not enabled, logging disabled");
}

#[cfg(not(feature = "subscriber"))]
pub fn init_tracing_dev() {
    eprintln!("Warning: subscriber feature not enabled, logging disabled");
}

#[cfg(not(feature = "subscriber"))]
pub fn log_frame_stats(_frame_time: f32, _fps: f32) {}

#[cfg(all(test, feature = "subscriber"))]
mod tests {
    use std::io;
    use std::sync::Arc;

    use parking_lot::Mutex;

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn frame_stats_are_structured_fields() {
        let capture = Capture::default();
        let writer = capture.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || super::log_frame_stats(0.5, 2.0));

        let output = String::from_utf8(capture.0.lock().clone()).unwrap();
        assert!(output.contains("frame stats"), "{output}");
        assert!(output.contains("frame_ms=500.0"), "{output}");
        assert!(output.contains("fps=2.0"), "{output}");
    }
}
