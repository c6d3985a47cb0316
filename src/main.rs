use std::process::ExitCode;

fn main() -> ExitCode {
    match urgentias_lib::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("urgentias: {e}");
            ExitCode::FAILURE
        }
    }
}
