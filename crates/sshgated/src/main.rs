//! Daemon entrypoint for the SSH command gateway.

use std::process::ExitCode;

fn main() -> ExitCode {
    match sshgated::run_daemon() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            report(&error);
            ExitCode::FAILURE
        }
    }
}

#[expect(
    clippy::print_stderr,
    reason = "telemetry may not be installed when launch fails"
)]
fn report(error: &sshgated::LaunchError) {
    eprintln!("sshgated: {error}");
}
