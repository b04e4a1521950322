//! Search command implementation.

use super::parse_collection;
use explore_core::{Config, DatasetController, Record};
use std::path::Path;

/// Runs the search command.
pub fn run(
    path: &Path,
    config: Config,
    collection: &str,
    query: &str,
    limit: usize,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let collection = parse_collection(collection)?;
    let controller = DatasetController::open_dir(path, config)?;
    let handle = controller.open()?;

    let hits = handle.search(collection, query)?;
    let shown: Vec<&Record> = hits.iter().take(limit).collect();

    match format {
        "json" => {
            let rows: Vec<serde_json::Value> = shown
                .iter()
                .map(|record| match record {
                    Record::Merchant(m) => serde_json::to_value(m),
                    Record::Atm(a) => serde_json::to_value(a),
                })
                .collect::<Result<_, _>>()?;
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        _ => {
            for record in &shown {
                match record {
                    Record::Merchant(m) => println!(
                        "[{}] {} ({})",
                        m.id,
                        m.name,
                        m.city.as_deref().unwrap_or("-")
                    ),
                    Record::Atm(a) => println!(
                        "[{}] {} ({})",
                        a.id,
                        a.name,
                        a.city.as_deref().unwrap_or("-")
                    ),
                }
            }
            println!();
            println!(
                "{} of {} {} match(es) for {:?}",
                shown.len(),
                hits.len(),
                collection,
                query
            );
        }
    }

    controller.close()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use explore_core::{encode_image, CashPoint, Merchant};
    use std::fs;
    use tempfile::tempdir;

    fn seeded_config(dir: &Path) -> Config {
        let seed = dir.join("seed.db");
        let records = [
            Record::from(Merchant {
                id: 1,
                name: "Corner Coffee".into(),
                ..Merchant::default()
            }),
            Record::from(CashPoint {
                id: 2,
                name: "Mall ATM".into(),
                ..CashPoint::default()
            }),
        ];
        fs::write(&seed, encode_image(0, &records).unwrap()).unwrap();
        Config::new().seed_path(seed)
    }

    #[test]
    fn search_runs_against_seeded_directory() {
        let temp = tempdir().unwrap();
        let data = temp.path().join("data");

        run(&data, seeded_config(temp.path()), "merchant", "coffee", 5, "json").unwrap();
        // The directory lock is released once the command returns.
        run(&data, seeded_config(temp.path()), "atm", "mall", 5, "text").unwrap();
        assert!(data.join("base.db").exists());
    }

    #[test]
    fn unknown_collection_is_rejected() {
        let temp = tempdir().unwrap();
        let data = temp.path().join("data");

        let result = run(&data, seeded_config(temp.path()), "bank", "x", 5, "text");
        assert!(result.is_err());
        assert!(!data.exists());
    }
}
