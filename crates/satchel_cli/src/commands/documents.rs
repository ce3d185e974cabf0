//! The `documents` command.

use satchel_gateway::encode_fields;
use satchel_store::PersistedState;
use serde_json::json;

/// Lists documents in the local store, optionally filtered to one
/// collection.
pub fn run(
    state: &PersistedState,
    collection: Option<&str>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut records: Vec<_> = state
        .documents
        .records
        .iter()
        .filter(|r| collection.is_none_or(|c| r.collection == c))
        .collect();
    records.sort_by(|a, b| {
        a.collection
            .cmp(&b.collection)
            .then(a.local_key.cmp(&b.local_key))
    });

    match format {
        "json" => {
            let value: Vec<_> = records
                .iter()
                .map(|r| {
                    json!({
                        "collection": r.collection,
                        "identity": r.identity().to_string(),
                        "local_key": r.local_key.get(),
                        "pending_create": r.is_pending_create(),
                        "fields": encode_fields(&r.fields),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        _ => {
            let mut current_collection = None::<&str>;
            for record in &records {
                if current_collection != Some(record.collection.as_str()) {
                    println!("{}:", record.collection);
                    current_collection = Some(record.collection.as_str());
                }
                let marker = if record.is_pending_create() {
                    " (pending create)"
                } else {
                    ""
                };
                println!(
                    "  {} [{} fields]{marker}",
                    record.identity(),
                    record.fields.len()
                );
            }
            println!("{} document(s)", records.len());
        }
    }

    Ok(())
}
