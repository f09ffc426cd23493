//! The `examforge list-models` command.

use std::path::Path;

use anyhow::Result;
use comfy_table::{Cell, Table};
use serde::Serialize;

use examforge_core::resolver::normalize_model_id;
use examforge_providers::{create_backend, load_config_from};

use super::print_json;

#[derive(Serialize)]
struct ListedModel {
    id: String,
    supports_generation: bool,
    modality: String,
    usable: bool,
}

pub async fn execute(config_path: Option<&Path>, json: bool) -> Result<()> {
    let config = load_config_from(config_path)?;
    let backend = create_backend(&config)?;
    let listing = backend.list_models().await?;
    let usable = examforge_core::resolver::usable_models(&listing);

    let models: Vec<ListedModel> = listing
        .iter()
        .map(|m| {
            let id = normalize_model_id(&m.id).to_string();
            ListedModel {
                usable: usable.contains(&id),
                id,
                supports_generation: m.supports_generation,
                modality: format!("{:?}", m.modality).to_lowercase(),
            }
        })
        .collect();

    if json {
        return print_json(&models);
    }
    if models.is_empty() {
        println!("Backend {} reported no models.", backend.name());
        return Ok(());
    }

    println!("Backend: {}", backend.name());
    let mut table = Table::new();
    table.set_header(vec!["Model", "Generation", "Modality", "Usable"]);
    for model in &models {
        table.add_row(vec![
            Cell::new(&model.id),
            Cell::new(if model.supports_generation { "yes" } else { "no" }),
            Cell::new(&model.modality),
            Cell::new(if model.usable { "yes" } else { "-" }),
        ]);
    }
    println!("{table}");
    Ok(())
}
