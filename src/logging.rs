//! Logger setup for drivers running one process per rank.

use flexi_logger::{json_format, Duplicate, FileSpec, FlexiLoggerError, Logger, LoggerHandle};
use log::LevelFilter;

/// Sets up logging for rank `rank`. Each rank logs JSON records to its own file
/// `<program>_rank<rank>.log.json` and duplicates info messages to stdout.
///
/// The returned handle must be kept alive for as long as logging is needed.
pub fn setup_logging_rank(rank: usize, level: LevelFilter) -> Result<LoggerHandle, FlexiLoggerError> {
    Logger::with(level)
        .format(json_format)
        .log_to_file(
            FileSpec::default()
                .discriminant(format!("rank{rank}"))
                .suppress_timestamp()
                .suffix("log.json"),
        )
        .duplicate_to_stdout(Duplicate::Info)
        .start()
}
