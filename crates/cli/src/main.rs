use std::process::ExitCode;

fn main() -> ExitCode {
    offercraft_cli::run()
}
