mod args;
mod output;

use std::io::{self, BufRead};

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use args::{Cli, Commands};
use mailprobe_lib::EmailValidator;

fn init_logging(verbose: bool) {
    // RUST_LOG a priorité sur -v
    let fallback = if verbose { "warn,mailprobe_lib=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let format = cli.parsed_format()?;

    let addresses: Vec<String> = if cli.stdin {
        let mut lines = Vec::new();
        for line in io::stdin().lock().lines() {
            let line = line.context("read stdin")?;
            if !line.trim().is_empty() {
                lines.push(line);
            }
        }
        lines
    } else if let Some(Commands::Validate { email }) = &cli.cmd {
        vec![email.clone()]
    } else {
        Cli::clap_command().print_help()?;
        println!();
        return Ok(());
    };

    let validator =
        EmailValidator::new(cli.validator_options()).context("initialise validator")?;
    let verdicts: Vec<_> = addresses
        .iter()
        .map(|address| validator.validate(address, cli.aggressive))
        .collect();

    output::emit(&verdicts, format, cli.out.as_deref(), cli.explain)?;

    // codes de sortie : 0 tout délivrable, 2 au moins un non délivrable, 1 fatal
    if verdicts.iter().any(|verdict| !verdict.deliverable) {
        std::process::exit(2);
    }
    Ok(())
}
