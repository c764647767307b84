use std::process::ExitCode;

fn main() -> ExitCode {
    match guildd::run_daemon() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("guildd: {error}");
            ExitCode::FAILURE
        }
    }
}
