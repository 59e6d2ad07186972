use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    match motion_display_lib::run(std::env::args().nth(1)).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            motion_display_lib::logging::report_fatal(&e);
            ExitCode::FAILURE
        }
    }
}
