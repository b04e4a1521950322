//! Verify command implementation.

use super::CommandError;
use explore_core::{Collection, ImageIndex};
use explore_storage::FileBackend;
use std::path::Path;

/// Verification result.
#[derive(Debug, Default)]
pub struct VerifyResult {
    /// Number of records checked.
    pub records_checked: usize,
    /// Number of records that decoded.
    pub valid_records: usize,
    /// List of errors found.
    pub errors: Vec<String>,
}

impl VerifyResult {
    fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Checks framing and checksum, then decodes every record.
pub fn verify_image(path: &Path) -> Result<VerifyResult, Box<dyn std::error::Error>> {
    let backend = FileBackend::open_read_only(path)?;
    let mut result = VerifyResult::default();

    let index = match ImageIndex::build(&backend) {
        Ok(index) => index,
        Err(e) => {
            result.errors.push(e.to_string());
            return Ok(result);
        }
    };

    for collection in Collection::ALL {
        for entry in index.entries(collection) {
            result.records_checked += 1;
            match index.read_record(&backend, entry) {
                Ok(_) => result.valid_records += 1,
                Err(e) => result.errors.push(format!(
                    "{} record at offset {}: {}",
                    collection, entry.offset, e
                )),
            }
        }
    }

    Ok(result)
}

/// Runs the verify command.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("Verifying image at {:?}", path);
    println!();

    let result = verify_image(path)?;
    println!("  Records checked: {}", result.records_checked);
    println!("  Valid records:   {}", result.valid_records);
    for error in &result.errors {
        println!("  Error: {}", error);
    }

    println!();
    if result.is_ok() {
        println!("✓ Image verification passed");
        Ok(())
    } else {
        println!("✗ Image verification failed");
        Err(CommandError::VerificationFailed(result.errors.len()).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use explore_core::{encode_image, CashPoint, Merchant, Record};
    use std::fs;
    use tempfile::tempdir;

    fn sample() -> Vec<u8> {
        encode_image(
            3,
            &[
                Record::from(Merchant {
                    id: 1,
                    name: "Corner Coffee".into(),
                    ..Merchant::default()
                }),
                Record::from(CashPoint {
                    id: 1,
                    name: "Mall ATM".into(),
                    ..CashPoint::default()
                }),
            ],
        )
        .unwrap()
    }

    #[test]
    fn valid_image_passes() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("explore.db");
        fs::write(&path, sample()).unwrap();

        let result = verify_image(&path).unwrap();
        assert!(result.is_ok());
        assert_eq!(result.records_checked, 2);
        assert_eq!(result.valid_records, 2);
    }

    #[test]
    fn flipped_byte_fails_checksum() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("explore.db");
        let mut bytes = sample();
        bytes[20] ^= 0x55;
        fs::write(&path, bytes).unwrap();

        let result = verify_image(&path).unwrap();
        assert!(!result.is_ok());
        assert!(run(&path).is_err());
    }
}
