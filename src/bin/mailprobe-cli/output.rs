#[cfg(feature = "with-serde")]
use anyhow::Context;
use anyhow::{Result, bail};

use crate::args::Format;
use mailprobe_lib::ValidationVerdict;

pub fn emit(
    verdicts: &[ValidationVerdict],
    format: Format,
    out: Option<&str>,
    explain: bool,
) -> Result<()> {
    match format {
        Format::Human => {
            if out.is_some() {
                bail!("--out requiert --format json ou ndjson");
            }
            for verdict in verdicts {
                for line in human_lines(verdict, explain) {
                    println!("{line}");
                }
            }
            Ok(())
        }
        Format::Json | Format::Ndjson => emit_json(verdicts, format, out),
    }
}

pub fn human_lines(verdict: &ValidationVerdict, explain: bool) -> Vec<String> {
    let tag = if verdict.deliverable {
        "OK".to_string()
    } else {
        verdict.result.as_str().to_ascii_uppercase()
    };
    let mut lines = vec![format!(
        "[{tag}] {} :: {} (confidence {}, {})",
        verdict.email, verdict.message, verdict.confidence, verdict.confidence_level
    )];
    if let Some(host) = &verdict.mx_host {
        lines.push(format!("        mx: {host}"));
    }
    if !verdict.flags.is_empty() {
        let flags: Vec<&str> = verdict.flags.iter().map(String::as_str).collect();
        lines.push(format!("        flags: {}", flags.join(", ")));
    }
    if explain {
        for reason in &verdict.reasoning {
            lines.push(format!("        why: {reason}"));
        }
        if let Some(report) = &verdict.catch_all {
            for line in &report.trace {
                lines.push(format!("        catch-all: {line}"));
            }
        }
        for line in &verdict.transcript {
            lines.push(format!("        smtp: {line}"));
        }
    }
    lines
}

#[cfg(feature = "with-serde")]
fn emit_json(verdicts: &[ValidationVerdict], format: Format, out: Option<&str>) -> Result<()> {
    let mut buf = Vec::new();
    if format == Format::Json {
        serde_json::to_writer_pretty(&mut buf, verdicts).context("serialize verdicts")?;
        buf.push(b'\n');
    } else {
        for verdict in verdicts {
            serde_json::to_writer(&mut buf, verdict).context("serialize verdict")?;
            buf.push(b'\n');
        }
    }
    match out {
        Some(path) => write_all_atomically(path, &buf),
        None => {
            use std::io::Write;
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&buf)?;
            stdout.flush()?;
            Ok(())
        }
    }
}

#[cfg(not(feature = "with-serde"))]
fn emit_json(_verdicts: &[ValidationVerdict], _format: Format, _out: Option<&str>) -> Result<()> {
    bail!("format json/ndjson nécessite la feature 'with-serde'")
}

#[cfg(feature = "with-serde")]
fn write_all_atomically(path: &str, bytes: &[u8]) -> Result<()> {
    use std::io::Write;
    let tmp = format!("{path}.tmp");
    {
        let mut f = std::fs::File::create(&tmp).with_context(|| format!("create {tmp}"))?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    std::fs::rename(&tmp, path).with_context(|| format!("rename {tmp} -> {path}"))?;
    Ok(())
}
