//! The `outbox` command.

use crate::commands::format_age;
use satchel_gateway::encode_fields;
use satchel_model::now_millis;
use satchel_store::PersistedState;
use serde_json::json;

/// Dumps outbox intents in sequence order.
pub fn run(
    state: &PersistedState,
    include_dead: bool,
    limit: Option<usize>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let entries: Vec<_> = state
        .outbox
        .entries
        .iter()
        .filter(|e| include_dead || !e.dead)
        .take(limit.unwrap_or(usize::MAX))
        .collect();

    match format {
        "json" => {
            let value: Vec<_> = entries
                .iter()
                .map(|e| {
                    json!({
                        "sequence": e.intent.sequence,
                        "action": e.intent.action.to_string(),
                        "collection": e.intent.collection,
                        "server_id": e.intent.server_id,
                        "local_key": e.intent.local_key.map(|k| k.get()),
                        "age_ms": e.intent.age_ms(now_millis()),
                        "rejected_attempts": e.rejected_attempts,
                        "dead": e.dead,
                        "payload": encode_fields(&e.intent.payload),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        _ => {
            for entry in &entries {
                let target = entry
                    .intent
                    .server_id
                    .as_deref()
                    .map(String::from)
                    .or_else(|| entry.intent.local_key.map(|k| format!("local:{k}")))
                    .unwrap_or_else(|| "-".into());
                let marker = if entry.dead {
                    " DEAD"
                } else if entry.rejected_attempts > 0 {
                    " (rejected before)"
                } else {
                    ""
                };
                println!(
                    "#{} {} {} -> {} age {}{marker}",
                    entry.intent.sequence,
                    entry.intent.action,
                    entry.intent.collection,
                    target,
                    format_age(entry.intent.age_ms(now_millis())),
                );
            }
            println!("{} intent(s)", entries.len());
        }
    }

    Ok(())
}
