//! Provides the main entry point to the program.
use human_panic::{metadata, setup_panic};
use merit::cli::run_cli;
use merit::log;

fn main() {
    setup_panic!(metadata!().support(
        "Open an issue with the model files and the output of `merit --version`"
    ));

    if let Err(err) = run_cli() {
        if log::is_logger_initialised() {
            ::log::error!("{err:?}");
        } else {
            eprintln!("Error: {err:?}");
        }

        std::process::exit(1);
    }
}
