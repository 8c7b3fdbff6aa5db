use colored::Colorize;
use serde_json::Value;
use skystack_core::{Project, Scope};
use skystack_engine::OutputStore;
use std::collections::BTreeMap;

/// Stack identity strings are `account:region:name`; scope expressions
/// address the logical name.
fn logical_name(identity: &str) -> &str {
    identity.splitn(3, ':').nth(2).unwrap_or(identity)
}

pub async fn handle(project: Project, scope: &Scope, json: bool) -> anyhow::Result<()> {
    let store = OutputStore::new(project.state_path());
    let stored = store.load().await?;

    let mut records: Vec<_> = stored
        .stacks
        .iter()
        .filter(|(identity, _)| scope.matches(logical_name(identity)))
        .collect();
    records.sort_by(|a, b| a.0.cmp(b.0));

    if json {
        let map: BTreeMap<String, Value> = records
            .iter()
            .flat_map(|(_, record)| {
                record
                    .outputs
                    .values()
                    .map(|output| (output.path.clone(), output.value.clone()))
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&map)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("{}", "No recorded outputs in scope.".yellow());
        return Ok(());
    }

    for (identity, record) in records {
        println!("{}", identity.bold());
        let mut outputs: Vec<_> = record.outputs.iter().collect();
        outputs.sort_by(|a, b| a.0.cmp(b.0));
        for (key, output) in outputs {
            println!("  {} = {}", key.cyan(), output.value);
            println!("    {}", output.path.dimmed());
        }
        let digest = record
            .applied_digest
            .as_deref()
            .map(|d| d.get(..12).unwrap_or(d).to_string())
            .unwrap_or_else(|| "none".to_string());
        println!(
            "  {}",
            format!("digest {digest}, updated {}", record.updated_at).dimmed()
        );
        println!();
    }
    Ok(())
}
