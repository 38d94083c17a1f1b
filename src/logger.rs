//! Logger setup for the exocall run
//!

use camino::Utf8Path;

use crate::cli;
use crate::globals::PROGRAM_NAME;
use crate::os_utils::create_dir_all;

/// Route log output to stderr, and to a log file when an output directory is given
///
fn setup_logger(output_dir: Option<&Utf8Path>, debug: bool) -> Result<(), fern::InitError> {
    let level = if debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    let logger = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}][{}][{}] {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                PROGRAM_NAME,
                record.level(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stderr());

    let logger = match output_dir {
        Some(output_dir) => {
            let log_filename = output_dir.join(format!("{PROGRAM_NAME}.log"));
            logger.chain(fern::log_file(log_filename)?)
        }
        None => logger,
    };

    logger.apply()?;
    Ok(())
}

/// Check and create the output directory, then setup the logger to write there
///
/// Until the logger is running, failures here are reported the same way as command-line
/// validation errors.
///
pub fn setup_output_dir_and_logger(output_dir: &Utf8Path, clobber: bool, debug: bool) {
    if let Err(msg) = cli::check_novel_dirname(output_dir, "Output directory")
        && !(clobber || output_dir.is_dir())
    {
        eprintln!("Invalid command-line setting: {msg}");
        std::process::exit(exitcode::USAGE);
    }
    create_dir_all(output_dir, "output");
    setup_logger(Some(output_dir), debug).unwrap();
}
