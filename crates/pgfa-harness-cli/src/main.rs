#![forbid(unsafe_code)]

fn main() {
    std::process::exit(pgfa_harness_cli::run());
}
