pub(crate) mod item;

use std::path::Path;
use std::process;

use serde::de::DeserializeOwned;

use respro_eval::Diagnostics;

use crate::{report_error, OutputFormat};

/// Read and deserialize a JSON file, exiting with a report on failure.
pub(crate) fn read_json<T: DeserializeOwned>(
    path: &Path,
    what: &str,
    output: OutputFormat,
    quiet: bool,
) -> T {
    let text = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            let msg = format!("error reading {} '{}': {}", what, path.display(), e);
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    };
    match serde_json::from_str(&text) {
        Ok(v) => v,
        Err(e) => {
            let msg = format!("error parsing {} '{}': {}", what, path.display(), e);
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    }
}

pub(crate) fn diagnostics_json(diagnostics: &Diagnostics) -> serde_json::Value {
    diagnostics.iter().map(|d| serde_json::json!(d.to_string())).collect()
}

pub(crate) fn print_diagnostics(diagnostics: &Diagnostics) {
    if diagnostics.is_empty() {
        return;
    }
    println!("{} diagnostic(s):", diagnostics.len());
    for d in diagnostics.iter() {
        println!("  {}", d);
    }
}

/// Print `name = value` lines for one namespace of a variable snapshot.
pub(crate) fn print_group(title: &str, group: &serde_json::Value) {
    let Some(map) = group.as_object() else {
        return;
    };
    if map.is_empty() {
        return;
    }
    println!("{}:", title);
    for (id, value) in map {
        println!("  {} = {}", id, value);
    }
}

pub(crate) fn print_pretty(value: &serde_json::Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(value)
            .unwrap_or_else(|e| format!("serialization error: {}", e))
    );
}
