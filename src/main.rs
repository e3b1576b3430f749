use anyhow::Result;
use machinestate::cli::Cli;

fn main() -> Result<()> {
    Cli::run()
}
