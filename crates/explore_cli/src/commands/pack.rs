//! Pack command implementation.

use explore_core::{write_image, CashPoint, Merchant, Record};
use explore_storage::FileBackend;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::info;

/// JSON input accepted by `pack`.
#[derive(Debug, Default, Deserialize)]
pub struct PackInput {
    /// Merchant rows.
    #[serde(default)]
    pub merchants: Vec<Merchant>,
    /// Cash-point rows.
    #[serde(default)]
    pub atms: Vec<CashPoint>,
}

impl PackInput {
    fn into_records(self) -> Vec<Record> {
        self.merchants
            .into_iter()
            .map(Record::from)
            .chain(self.atms.into_iter().map(Record::from))
            .collect()
    }
}

/// Runs the pack command.
pub fn run(input: &Path, output: &Path, timestamp: i64) -> Result<(), Box<dyn std::error::Error>> {
    let data = fs::read(input)?;
    let parsed: PackInput = serde_json::from_slice(&data)?;
    let (merchants, atms) = (parsed.merchants.len(), parsed.atms.len());

    let mut backend = FileBackend::create(output)?;
    write_image(&mut backend, timestamp, &parsed.into_records())?;

    info!(output = %output.display(), timestamp, merchants, atms, "image written");
    println!(
        "Packed {} merchants and {} atms into {:?} (version {})",
        merchants, atms, output, timestamp
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use explore_core::{Collection, ImageIndex};
    use tempfile::tempdir;

    #[test]
    fn packs_json_into_valid_image() {
        let temp = tempdir().unwrap();
        let input = temp.path().join("records.json");
        let output = temp.path().join("explore.db");
        fs::write(
            &input,
            r#"{
                "merchants": [
                    {"id": 1, "name": "Corner Coffee", "city": "Lisbon", "payment_method": "dash"},
                    {"id": 2, "name": "Book Nook"}
                ],
                "atms": [{"id": 9, "name": "Station ATM", "manufacturer": "genmega"}]
            }"#,
        )
        .unwrap();

        run(&input, &output, 1_700_000_000_000).unwrap();

        let index = ImageIndex::from_bytes(&fs::read(&output).unwrap()).unwrap();
        assert_eq!(index.header().timestamp, 1_700_000_000_000);
        assert_eq!(index.count(Collection::Merchant), 2);
        assert_eq!(index.count(Collection::Atm), 1);
    }

    #[test]
    fn missing_arrays_pack_empty_image() {
        let temp = tempdir().unwrap();
        let input = temp.path().join("empty.json");
        let output = temp.path().join("empty.db");
        fs::write(&input, "{}").unwrap();

        run(&input, &output, 5).unwrap();

        let index = ImageIndex::from_bytes(&fs::read(&output).unwrap()).unwrap();
        assert_eq!(index.header().record_count, 0);
    }
}
