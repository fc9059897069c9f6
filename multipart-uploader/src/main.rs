mod config;
mod runner;
mod telemetry;

fn main() -> std::process::ExitCode {
    runner::run()
}
