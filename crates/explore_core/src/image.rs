//! Dataset image format.
//!
//! Dataset files, staged updates and the bundled seed share one format:
//!
//! ```text
//! | magic (4) | version (2) | timestamp (8) | record_count (4) | records... | crc32 (4) |
//! ```
//!
//! Each record is framed as:
//!
//! ```text
//! | len (4, includes itself) | collection tag (1) | CBOR payload |
//! ```
//!
//! The timestamp is the update's embedded version (milliseconds since the
//! Unix epoch); it names the dataset once the update is promoted.

use crate::error::{CoreError, CoreResult};
use crate::record::{Collection, Record};
use explore_storage::StorageBackend;
use std::collections::BTreeMap;

/// Magic bytes for dataset images.
pub const IMAGE_MAGIC: [u8; 4] = *b"EXPL";
/// Current image format version.
pub const IMAGE_VERSION: u16 = 1;
/// Header size (magic + version + timestamp + record_count).
pub const HEADER_SIZE: usize = 4 + 2 + 8 + 4;
/// Footer size (checksum).
pub const FOOTER_SIZE: usize = 4;
/// Record frame prefix (length + collection tag).
const FRAME_PREFIX: usize = 4 + 1;

#[inline]
fn slice_to_array_8(slice: &[u8]) -> [u8; 8] {
    [
        slice[0], slice[1], slice[2], slice[3], slice[4], slice[5], slice[6], slice[7],
    ]
}

#[inline]
fn slice_to_array_4(slice: &[u8]) -> [u8; 4] {
    [slice[0], slice[1], slice[2], slice[3]]
}

/// Fixed-size image header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageHeader {
    /// Format version.
    pub version: u16,
    /// Embedded version timestamp (ms since epoch).
    pub timestamp: i64,
    /// Number of records in the image.
    pub record_count: u32,
}

impl ImageHeader {
    /// Parses the header from the first [`HEADER_SIZE`] bytes of an image.
    pub fn decode(data: &[u8]) -> CoreResult<Self> {
        if data.len() < HEADER_SIZE {
            return Err(CoreError::invalid_format("image header too short"));
        }
        if data[0..4] != IMAGE_MAGIC {
            return Err(CoreError::invalid_format("invalid image magic"));
        }

        let version = u16::from_le_bytes([data[4], data[5]]);
        if version != IMAGE_VERSION {
            return Err(CoreError::invalid_format(format!(
                "unsupported image version: {version}"
            )));
        }

        Ok(Self {
            version,
            timestamp: i64::from_le_bytes(slice_to_array_8(&data[6..14])),
            record_count: u32::from_le_bytes(slice_to_array_4(&data[14..18])),
        })
    }

    fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&IMAGE_MAGIC);
        buf.extend_from_slice(&self.version.to_le_bytes());
        buf.extend_from_slice(&self.timestamp.to_le_bytes());
        buf.extend_from_slice(&self.record_count.to_le_bytes());
    }
}

/// Reads only the header of the image stored in `backend`.
///
/// This is how the embedded version of a staged update is read without
/// loading the whole file.
pub fn read_header(backend: &dyn StorageBackend) -> CoreResult<ImageHeader> {
    let size = backend.size()?;
    if size < (HEADER_SIZE + FOOTER_SIZE) as u64 {
        return Err(CoreError::invalid_format("image too small"));
    }
    ImageHeader::decode(&backend.read_at(0, HEADER_SIZE)?)
}

/// Encodes a complete image.
pub fn encode_image(timestamp: i64, records: &[Record]) -> CoreResult<Vec<u8>> {
    let record_count = u32::try_from(records.len())
        .map_err(|_| CoreError::invalid_format("too many records for one image"))?;
    let header = ImageHeader {
        version: IMAGE_VERSION,
        timestamp,
        record_count,
    };

    let mut data = Vec::with_capacity(HEADER_SIZE + FOOTER_SIZE + records.len() * 64);
    header.encode_into(&mut data);

    for record in records {
        let payload = record.encode_payload()?;
        let frame_len = u32::try_from(FRAME_PREFIX + payload.len())
            .map_err(|_| CoreError::invalid_format("record too large"))?;
        data.extend_from_slice(&frame_len.to_le_bytes());
        data.push(record.collection().tag());
        data.extend_from_slice(&payload);
    }

    let checksum = compute_crc32(&data);
    data.extend_from_slice(&checksum.to_le_bytes());

    Ok(data)
}

/// Writes an image to the end of an (empty) backend and syncs it.
pub fn write_image(
    backend: &mut dyn StorageBackend,
    timestamp: i64,
    records: &[Record],
) -> CoreResult<()> {
    let data = encode_image(timestamp, records)?;
    backend.append(&data)?;
    backend.sync()?;
    Ok(())
}

/// Location of one record inside an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    /// Collection of the record.
    pub collection: Collection,
    /// Offset of the CBOR payload.
    pub offset: u64,
    /// Payload length.
    pub len: usize,
}

/// Verified index over an image stored in a backend.
///
/// Building the index checks magic, version, checksum and framing; rows are
/// decoded lazily by [`ImageIndex::read_record`].
#[derive(Debug, Clone)]
pub struct ImageIndex {
    header: ImageHeader,
    entries: Vec<IndexEntry>,
    counts: BTreeMap<Collection, u64>,
}

impl ImageIndex {
    /// Verifies the image in `backend` and indexes its records.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` or `ChecksumMismatch` if the image is not
    /// valid.
    pub fn build(backend: &dyn StorageBackend) -> CoreResult<Self> {
        let data = backend.read_all()?;
        Self::from_bytes(&data)
    }

    /// Verifies and indexes an in-memory image.
    pub fn from_bytes(data: &[u8]) -> CoreResult<Self> {
        if data.len() < HEADER_SIZE + FOOTER_SIZE {
            return Err(CoreError::invalid_format("image too small"));
        }
        let header = ImageHeader::decode(data)?;

        let checksum_offset = data.len() - FOOTER_SIZE;
        let stored = u32::from_le_bytes(slice_to_array_4(&data[checksum_offset..]));
        let computed = compute_crc32(&data[..checksum_offset]);
        if stored != computed {
            return Err(CoreError::ChecksumMismatch {
                expected: stored,
                actual: computed,
            });
        }

        // The header count is only trusted once the frames agree with it.
        let max_records = (checksum_offset - HEADER_SIZE) / FRAME_PREFIX;
        let mut entries = Vec::with_capacity((header.record_count as usize).min(max_records));
        let mut counts = BTreeMap::new();
        let mut offset = HEADER_SIZE;

        while offset < checksum_offset {
            if offset + FRAME_PREFIX > checksum_offset {
                return Err(CoreError::invalid_format("truncated record frame"));
            }
            let frame_len =
                u32::from_le_bytes(slice_to_array_4(&data[offset..offset + 4])) as usize;
            if frame_len < FRAME_PREFIX || offset + frame_len > checksum_offset {
                return Err(CoreError::invalid_format(format!(
                    "record at offset {offset} extends beyond data"
                )));
            }
            let tag = data[offset + 4];
            let collection = Collection::from_tag(tag).ok_or_else(|| {
                CoreError::invalid_format(format!("unknown collection tag {tag} at {offset}"))
            })?;

            entries.push(IndexEntry {
                collection,
                offset: (offset + FRAME_PREFIX) as u64,
                len: frame_len - FRAME_PREFIX,
            });
            *counts.entry(collection).or_insert(0) += 1;
            offset += frame_len;
        }

        if entries.len() != header.record_count as usize {
            return Err(CoreError::invalid_format(format!(
                "record count mismatch: expected {}, got {}",
                header.record_count,
                entries.len()
            )));
        }

        Ok(Self {
            header,
            entries,
            counts,
        })
    }

    /// The image header.
    #[must_use]
    pub fn header(&self) -> &ImageHeader {
        &self.header
    }

    /// Number of rows in `collection`.
    #[must_use]
    pub fn count(&self, collection: Collection) -> u64 {
        self.counts.get(&collection).copied().unwrap_or(0)
    }

    /// Index entries of `collection`, in image order.
    pub fn entries(&self, collection: Collection) -> impl Iterator<Item = &IndexEntry> {
        self.entries
            .iter()
            .filter(move |entry| entry.collection == collection)
    }

    /// Reads and decodes one record.
    pub fn read_record(
        &self,
        backend: &dyn StorageBackend,
        entry: &IndexEntry,
    ) -> CoreResult<Record> {
        let payload = backend.read_at(entry.offset, entry.len)?;
        Record::decode_payload(entry.collection, &payload)
    }

    /// Decodes every record once, failing on the first undecodable row.
    pub fn check_records(&self, backend: &dyn StorageBackend) -> CoreResult<()> {
        for entry in &self.entries {
            self.read_record(backend, entry).map_err(|e| match e {
                CoreError::Codec { message } => CoreError::invalid_format(format!(
                    "{} record at offset {}: {message}",
                    entry.collection, entry.offset
                )),
                other => other,
            })?;
        }
        Ok(())
    }
}

/// Frames raw payloads into an image whose header claims `record_count`.
#[cfg(test)]
pub(crate) fn encode_frames(
    timestamp: i64,
    record_count: u32,
    frames: &[(Collection, Vec<u8>)],
) -> Vec<u8> {
    let mut data = Vec::new();
    ImageHeader {
        version: IMAGE_VERSION,
        timestamp,
        record_count,
    }
    .encode_into(&mut data);
    for (collection, payload) in frames {
        let frame_len = (FRAME_PREFIX + payload.len()) as u32;
        data.extend_from_slice(&frame_len.to_le_bytes());
        data.push(collection.tag());
        data.extend_from_slice(payload);
    }
    let checksum = compute_crc32(&data);
    data.extend_from_slice(&checksum.to_le_bytes());
    data
}

/// Computes a CRC32 checksum (IEEE polynomial).
#[must_use]
pub fn compute_crc32(data: &[u8]) -> u32 {
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    !crc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{CashPoint, Merchant};
    use explore_storage::InMemoryBackend;

    fn sample_records() -> Vec<Record> {
        vec![
            Merchant {
                id: 1,
                name: "Bakery".into(),
                ..Merchant::default()
            }
            .into(),
            CashPoint {
                id: 1,
                name: "Station ATM".into(),
                ..CashPoint::default()
            }
            .into(),
            Merchant {
                id: 2,
                name: "Bike shop".into(),
                ..Merchant::default()
            }
            .into(),
        ]
    }

    #[test]
    fn crc32_known_value() {
        assert_eq!(compute_crc32(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn index_counts_collections() {
        let data = encode_image(1_700_000_000_000, &sample_records()).unwrap();
        let index = ImageIndex::from_bytes(&data).unwrap();

        assert_eq!(index.header().timestamp, 1_700_000_000_000);
        assert_eq!(index.header().record_count, 3);
        assert_eq!(index.count(Collection::Merchant), 2);
        assert_eq!(index.count(Collection::Atm), 1);
    }

    #[test]
    fn records_read_back_through_backend() {
        let mut backend = InMemoryBackend::new();
        write_image(&mut backend, 5, &sample_records()).unwrap();

        let index = ImageIndex::build(&backend).unwrap();
        let names: Vec<String> = index
            .entries(Collection::Merchant)
            .map(|entry| index.read_record(&backend, entry).unwrap().name().to_string())
            .collect();
        assert_eq!(names, vec!["Bakery", "Bike shop"]);
    }

    #[test]
    fn header_readable_without_full_scan() {
        let mut backend = InMemoryBackend::new();
        write_image(&mut backend, 42, &sample_records()).unwrap();

        let header = read_header(&backend).unwrap();
        assert_eq!(header.timestamp, 42);
        assert_eq!(header.version, IMAGE_VERSION);
    }

    #[test]
    fn empty_image_is_valid() {
        let data = encode_image(0, &[]).unwrap();
        assert_eq!(data.len(), HEADER_SIZE + FOOTER_SIZE);

        let index = ImageIndex::from_bytes(&data).unwrap();
        assert_eq!(index.count(Collection::Merchant), 0);
        assert_eq!(index.count(Collection::Atm), 0);
    }

    #[test]
    fn flipped_byte_fails_checksum() {
        let mut data = encode_image(1, &sample_records()).unwrap();
        data[HEADER_SIZE + 6] ^= 0xFF;

        let result = ImageIndex::from_bytes(&data);
        assert!(matches!(result, Err(CoreError::ChecksumMismatch { .. })));
    }

    #[test]
    fn invalid_magic_rejected() {
        let mut data = encode_image(1, &[]).unwrap();
        data[0..4].copy_from_slice(b"SQLi");
        assert!(matches!(
            ImageIndex::from_bytes(&data),
            Err(CoreError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn too_small_rejected() {
        let backend = InMemoryBackend::with_data(vec![0u8; 10]);
        assert!(read_header(&backend).is_err());
        assert!(ImageIndex::build(&backend).is_err());
    }

    #[test]
    fn oversized_record_count_is_rejected() {
        let data = encode_frames(1, u32::MAX, &[]);

        let result = ImageIndex::from_bytes(&data);
        assert!(matches!(result, Err(CoreError::InvalidFormat { .. })));
    }

    #[test]
    fn undecodable_payload_fails_record_check() {
        let data = encode_frames(1, 1, &[(Collection::Merchant, vec![0xff, 0x00, 0x13])]);
        let backend = InMemoryBackend::with_data(data);

        let index = ImageIndex::build(&backend).unwrap();
        assert_eq!(index.count(Collection::Merchant), 1);
        assert!(matches!(
            index.check_records(&backend),
            Err(CoreError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn valid_records_pass_record_check() {
        let mut backend = InMemoryBackend::new();
        write_image(&mut backend, 3, &sample_records()).unwrap();

        let index = ImageIndex::build(&backend).unwrap();
        index.check_records(&backend).unwrap();
    }
}
