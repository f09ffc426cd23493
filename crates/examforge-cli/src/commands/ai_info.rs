//! The `examforge ai-info` command.

use std::path::Path;

use anyhow::Result;
use comfy_table::{Cell, Table};
use serde::Serialize;

use examforge_core::resolver::RuntimeInfo;

use super::{engine, print_json};

const PROBE_PROMPT: &str = "Reply with the single word OK.";

#[derive(Serialize)]
struct AiInfo {
    candidates: Vec<String>,
    #[serde(flatten)]
    runtime: RuntimeInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    probe: Option<Probe>,
}

#[derive(Serialize)]
struct Probe {
    model: String,
    latency_ms: u64,
    reply_chars: usize,
}

pub async fn execute(probe: bool, config_path: Option<&Path>, json: bool) -> Result<()> {
    let engine = engine(config_path).await?;
    let resolver = engine.resolver();
    let candidates = resolver.candidates().await;

    let probe = if probe {
        let response = resolver.generate(PROBE_PROMPT, &[]).await?;
        Some(Probe {
            model: response.model,
            latency_ms: response.latency_ms,
            reply_chars: response.text.chars().count(),
        })
    } else {
        None
    };

    let info = AiInfo {
        candidates,
        runtime: engine.runtime_info(),
        probe,
    };
    if json {
        return print_json(&info);
    }

    let runtime = &info.runtime;
    let mut table = Table::new();
    table.set_header(vec!["Setting", "Value"]);
    let rows = [
        ("Backend", runtime.backend.clone()),
        ("Configured model", runtime.configured_model.clone()),
        ("Fallback models", runtime.fallback_models.join(", ")),
        ("Credentials", runtime.credentials_configured.to_string()),
        (
            "Discovered models",
            runtime
                .discovered_models
                .map_or_else(|| "none (static list)".to_string(), |n| n.to_string()),
        ),
        ("Candidate order", info.candidates.join(" > ")),
        (
            "Last model used",
            runtime.last_model_used.clone().unwrap_or_else(|| "-".into()),
        ),
        (
            "Last credential",
            runtime
                .last_credential
                .map_or_else(|| "-".to_string(), |n| format!("#{n}")),
        ),
    ];
    for (name, value) in rows {
        table.add_row(vec![Cell::new(name), Cell::new(value)]);
    }
    println!("{table}");

    if let Some(probe) = &info.probe {
        println!(
            "Probe answered by {} in {}ms ({} chars)",
            probe.model, probe.latency_ms, probe.reply_chars
        );
    }
    Ok(())
}
