//! The `status` command.

use crate::commands::format_age;
use satchel_model::now_millis;
use satchel_store::PersistedState;
use serde_json::json;
use std::collections::BTreeMap;

/// Prints sync status derived from persisted state.
pub fn run(state: &PersistedState, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mut per_collection: BTreeMap<&str, usize> = BTreeMap::new();
    for record in &state.documents.records {
        *per_collection.entry(record.collection.as_str()).or_default() += 1;
    }
    let pending_creates = state
        .documents
        .records
        .iter()
        .filter(|r| r.is_pending_create())
        .count();

    let live: Vec<_> = state.outbox.entries.iter().filter(|e| !e.dead).collect();
    let dead = state.outbox.entries.len() - live.len();
    let oldest_age_ms = live
        .iter()
        .map(|e| e.intent.age_ms(now_millis()))
        .max();

    match format {
        "json" => {
            let value = json!({
                "schema_version": state.documents.schema_version,
                "documents": {
                    "total": state.documents.records.len(),
                    "pending_creates": pending_creates,
                    "collections": per_collection,
                },
                "outbox": {
                    "pending": live.len(),
                    "dead_letters": dead,
                    "oldest_pending_age_ms": oldest_age_ms,
                    "next_sequence": state.outbox.next_sequence,
                },
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        _ => {
            println!("Documents: {}", state.documents.records.len());
            for (collection, count) in &per_collection {
                println!("  {collection}: {count}");
            }
            println!("Pending creates: {pending_creates}");
            println!("Outbox: {} pending, {} dead-lettered", live.len(), dead);
            if let Some(age) = oldest_age_ms {
                println!("Oldest pending intent: {}", format_age(age));
            }
        }
    }

    Ok(())
}
