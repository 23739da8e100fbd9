use std::collections::BTreeMap;
use std::path::Path;
use std::process;

use respro_eval::{process_item, variables_json, EngineConfig, ItemDocument, OperatorRegistry};
use tracing::debug;

use super::{diagnostics_json, print_diagnostics, print_group, print_pretty, read_json};
use crate::{report_error, OutputFormat};

pub(crate) fn cmd_item(
    item_path: &Path,
    responses_path: Option<&Path>,
    config: &EngineConfig,
    output: OutputFormat,
    quiet: bool,
) {
    let item: ItemDocument = read_json(item_path, "item", output, quiet);
    let responses: BTreeMap<String, serde_json::Value> = match responses_path {
        Some(p) => read_json(p, "responses", output, quiet),
        None => BTreeMap::new(),
    };

    debug!(path = %item_path.display(), responses = responses.len(), "loaded item");

    let operators = OperatorRegistry::new();
    let mut random = config.random_source();
    let run = match process_item(
        &item,
        &responses,
        &operators,
        &mut random,
        config.template_policy(),
    ) {
        Ok(run) => run,
        Err(e) => {
            let msg = format!("error: {}", e);
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    };

    if quiet {
        return;
    }
    let variables = variables_json(&run.context);
    match output {
        OutputFormat::Json => {
            let template = run.template.map(|t| {
                serde_json::json!({
                    "attempts": t.attempts,
                    "satisfied": t.satisfied,
                })
            });
            print_pretty(&serde_json::json!({
                "item": item.identifier,
                "signal": run.signal.as_str(),
                "template": template,
                "variables": variables,
                "diagnostics": diagnostics_json(&run.diagnostics),
            }));
        }
        OutputFormat::Text => {
            if let Some(id) = &item.identifier {
                println!("Item: {}", id);
            }
            if let Some(t) = run.template {
                let state = if t.satisfied { "satisfied" } else { "unsatisfied" };
                println!("Template: {} after {} attempt(s)", state, t.attempts);
            }
            println!("Signal: {}", run.signal.as_str());
            print_group("Templates", &variables["templates"]);
            print_group("Responses", &variables["responses"]);
            print_group("Outcomes", &variables["outcomes"]);
            print_diagnostics(&run.diagnostics);
        }
    }
}
