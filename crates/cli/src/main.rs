use std::process::ExitCode;

fn main() -> ExitCode {
    fiscus_cli::run()
}
