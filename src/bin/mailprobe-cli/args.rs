use std::time::Duration;

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use mailprobe_lib::ValidatorOptions;

#[derive(Parser)]
#[command(name = "mailprobe-cli", version, about = "Vérifie la délivrabilité d'adresses e-mail")]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Option<Commands>,

    /// lit des adresses depuis stdin (une par ligne)
    #[arg(long)]
    pub stdin: bool,

    /// write report to file (JSON/NDJSON selon --format)
    #[arg(long)]
    pub out: Option<String>,

    /// format: human|json|ndjson
    #[arg(long, default_value = "human")]
    pub format: String,

    /// mode agressif : les verdicts douteux deviennent `invalid`
    #[arg(long, global = true)]
    pub aggressive: bool,

    /// nom utilisé pour EHLO/HELO
    #[arg(long, global = true)]
    pub helo: Option<String>,

    /// enveloppe MAIL FROM (par défaut postmaster@domaine)
    #[arg(long = "mail-from", global = true)]
    pub mail_from: Option<String>,

    /// port SMTP
    #[arg(long, default_value_t = 25, global = true)]
    pub port: u16,

    /// timeout par étape SMTP (ms)
    #[arg(long = "timeout-ms", global = true)]
    pub timeout_ms: Option<u64>,

    /// désactive la détection catch-all
    #[arg(long = "no-catchall", global = true)]
    pub no_catchall: bool,

    /// affiche le raisonnement et la transcription SMTP (format human)
    #[arg(long, global = true)]
    pub explain: bool,

    /// logs détaillés sur stderr (RUST_LOG a priorité)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    Validate {
        /// adresse e-mail à tester
        email: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Human,
    Json,
    Ndjson,
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    pub fn clap_command() -> clap::Command {
        <Self as clap::CommandFactory>::command()
    }

    pub fn parsed_format(&self) -> Result<Format> {
        match self.format.as_str() {
            "human" => Ok(Format::Human),
            "json" => Ok(Format::Json),
            "ndjson" => Ok(Format::Ndjson),
            other => bail!("unknown --format '{other}', use: human|json|ndjson"),
        }
    }

    pub fn validator_options(&self) -> ValidatorOptions {
        let mut options = ValidatorOptions {
            catchall_enabled: !self.no_catchall,
            ..ValidatorOptions::default()
        };
        if let Some(ms) = self.timeout_ms {
            options = options.with_smtp_timeout(Duration::from_millis(ms));
        }
        options.probe.port = self.port;
        options.probe.helo_domain = self.helo.clone();
        options.probe.envelope_sender = self.mail_from.clone();
        options
    }
}
