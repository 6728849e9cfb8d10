pub mod app;
pub mod cli;
pub mod domain;
pub mod infra;
pub mod ui;

use tracing::Level;

/// Install the stderr log subscriber. Verbosity 0 shows warnings, 1 adds
/// info, 2 or more adds debug output.
pub fn init(verbosity: u8) {
    let level = match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    };
    // A second call (e.g. from tests) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
