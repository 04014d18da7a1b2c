//! Text exposition format writer.

use std::io::{self, Write};

use super::model::{MetricFamily, Sample};

/// Writes every family in order.
pub fn write_families<W: Write>(out: &mut W, families: &[MetricFamily]) -> io::Result<()> {
    for family in families {
        write_family(out, family)?;
    }
    Ok(())
}

/// Writes one `HELP`/`TYPE` block followed by the family's samples.
pub fn write_family<W: Write>(out: &mut W, family: &MetricFamily) -> io::Result<()> {
    if !family.help.is_empty() {
        writeln!(out, "# HELP {} {}", family.name, escape_help(&family.help))?;
    }
    writeln!(out, "# TYPE {} {}", family.name, family.kind)?;
    for sample in &family.samples {
        write_sample(out, sample)?;
    }
    Ok(())
}

fn write_sample<W: Write>(out: &mut W, sample: &Sample) -> io::Result<()> {
    out.write_all(sample.name.as_bytes())?;
    if !sample.labels.is_empty() {
        out.write_all(b"{")?;
        for (idx, (key, value)) in sample.labels.iter().enumerate() {
            if idx > 0 {
                out.write_all(b",")?;
            }
            write!(out, "{}=\"{}\"", key, escape_label_value(value))?;
        }
        out.write_all(b"}")?;
    }
    write!(out, " {}", format_value(sample.value))?;
    if let Some(ts) = sample.timestamp_ms {
        write!(out, " {}", ts)?;
    }
    out.write_all(b"\n")
}

/// Encodes families into a string.
pub fn encode(families: &[MetricFamily]) -> String {
    let mut buffer = Vec::new();
    // Writing into a Vec cannot fail.
    let _ = write_families(&mut buffer, families);
    String::from_utf8_lossy(&buffer).into_owned()
}

fn escape_label_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            other => out.push(other),
        }
    }
    out
}

fn escape_help(help: &str) -> String {
    let mut out = String::with_capacity(help.len());
    for c in help.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            other => out.push(other),
        }
    }
    out
}

fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value == f64::INFINITY {
        "+Inf".to_string()
    } else if value == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        value.to_string()
    }
}
