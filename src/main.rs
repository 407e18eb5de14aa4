#[macro_use]
extern crate log;

use std::process::ExitCode;

fn main() -> ExitCode {
    env_logger::init();

    match bnkr_front::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}
