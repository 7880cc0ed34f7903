use std::process::ExitCode;

fn main() -> ExitCode {
    assetmap_cli::run()
}
