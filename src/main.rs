use std::io::{self, BufWriter, Write};

use anyhow::{bail, Context, Result};
use bamseek::bam::Reader;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const USAGE: &str = "usage: bamseek [--header] <file.bam> [ref[:start-end]]";

/// A region given as `name`, `name:start` or `name:start-end` (1-based, inclusive)
struct RegionArg {
    name: String,
    start: u32,
    end: Option<u32>,
}

/// Parses a region argument.
///
/// Reference names may contain `:`, so a text naming a known reference is
/// taken whole before any `name:span` split is tried.
fn parse_region(text: &str, is_reference: impl Fn(&str) -> bool) -> Result<RegionArg> {
    let whole = RegionArg {
        name: text.to_string(),
        start: 0,
        end: None,
    };
    if is_reference(text) {
        return Ok(whole);
    }
    let Some((name, span)) = text.rsplit_once(':') else {
        return Ok(whole);
    };
    let span = span.replace(',', "");
    let (start, end) = match span.split_once('-') {
        Some((start, end)) => (start, Some(end)),
        None => (span.as_str(), None),
    };
    let start: u32 = start
        .parse()
        .with_context(|| format!("invalid region start in {text:?}"))?;
    let end = end
        .map(str::parse::<u32>)
        .transpose()
        .with_context(|| format!("invalid region end in {text:?}"))?;
    Ok(RegionArg {
        name: name.to_string(),
        start: start.saturating_sub(1),
        end,
    })
}

fn print_records(path: &str, region: Option<&str>, header: bool) -> Result<()> {
    let mut reader = Reader::from_path(path).with_context(|| format!("opening {path}"))?;
    let mut out = BufWriter::new(io::stdout().lock());

    if header {
        let text = reader.header().to_text()?;
        if !text.is_empty() {
            writeln!(out, "{text}")?;
        }
    }

    let names: Vec<String> = reader
        .references()
        .iter()
        .map(|r| r.name().to_string())
        .collect();
    let mut count = 0usize;
    match region {
        None => {
            for record in reader.records() {
                writeln!(out, "{}", record?.to_sam(&names)?)?;
                count += 1;
            }
        }
        Some(region) => {
            let region = parse_region(region, |name| reader.reference_id(name).is_some())?;
            for record in reader.query(region.name.as_str(), region.start, region.end)? {
                writeln!(out, "{}", record?.to_sam(&names)?)?;
                count += 1;
            }
        }
    }
    out.flush()?;
    tracing::info!(count, "printed records");
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let mut header = false;
    let mut positional = Vec::new();
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--header" | "-H" => header = true,
            "--help" | "-h" => {
                eprintln!("{USAGE}");
                return Ok(());
            }
            _ => positional.push(arg),
        }
    }

    match positional.as_slice() {
        [path] => print_records(path, None, header),
        [path, region] => print_records(path, Some(region), header),
        _ => bail!(USAGE),
    }
}
