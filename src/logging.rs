use env_logger::Builder;
use log::LevelFilter;
use std::io::Write;

/// Install the process-wide logger.
///
/// Records are written as `<local timestamp> - <LEVEL> - <message>`. The
/// default level is `info`, overridable through `RUST_LOG`. Calling this more
/// than once is harmless: later calls leave the first logger in place.
pub fn init_logging() {
    let _ = Builder::new()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} - {} - {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S,%3f"),
                record.level(),
                record.args()
            )
        })
        .try_init();
}
