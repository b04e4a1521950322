//! Merchant and cash-point records.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The collections of an explore dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    /// Merchants accepting payment.
    Merchant,
    /// Cash points (ATMs).
    Atm,
}

impl Collection {
    /// All collections, in image order.
    pub const ALL: [Collection; 2] = [Collection::Merchant, Collection::Atm];

    /// Tag byte used in the image format.
    #[must_use]
    pub const fn tag(self) -> u8 {
        match self {
            Self::Merchant => 1,
            Self::Atm => 2,
        }
    }

    /// Resolves an image tag byte.
    #[must_use]
    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::Merchant),
            2 => Some(Self::Atm),
            _ => None,
        }
    }

    /// Collection name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Merchant => "merchant",
            Self::Atm => "atm",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A merchant that accepts payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Merchant {
    /// Row id.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Street address.
    #[serde(default)]
    pub address: Option<String>,
    /// City.
    #[serde(default)]
    pub city: Option<String>,
    /// Territory (state, region).
    #[serde(default)]
    pub territory: Option<String>,
    /// Latitude in degrees.
    #[serde(default)]
    pub latitude: Option<f64>,
    /// Longitude in degrees.
    #[serde(default)]
    pub longitude: Option<f64>,
    /// Data provider.
    #[serde(default)]
    pub source: Option<String>,
    /// `dash`, `gift card`, ...
    #[serde(default)]
    pub payment_method: Option<String>,
    /// `physical`, `online` or `both`.
    #[serde(default)]
    pub merchant_type: Option<String>,
    /// Whether the merchant is currently listed.
    #[serde(default = "listed")]
    pub active: bool,
}

/// A cash point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashPoint {
    /// Row id.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Street address.
    #[serde(default)]
    pub address: Option<String>,
    /// City.
    #[serde(default)]
    pub city: Option<String>,
    /// Territory (state, region).
    #[serde(default)]
    pub territory: Option<String>,
    /// Latitude in degrees.
    #[serde(default)]
    pub latitude: Option<f64>,
    /// Longitude in degrees.
    #[serde(default)]
    pub longitude: Option<f64>,
    /// Data provider.
    #[serde(default)]
    pub source: Option<String>,
    /// Machine manufacturer.
    #[serde(default)]
    pub manufacturer: Option<String>,
    /// Postal code.
    #[serde(default)]
    pub postcode: Option<String>,
    /// Whether the cash point is currently listed.
    #[serde(default = "listed")]
    pub active: bool,
}

fn listed() -> bool {
    true
}

impl Default for Merchant {
    fn default() -> Self {
        Self {
            id: 0,
            name: String::new(),
            address: None,
            city: None,
            territory: None,
            latitude: None,
            longitude: None,
            source: None,
            payment_method: None,
            merchant_type: None,
            active: listed(),
        }
    }
}

impl Default for CashPoint {
    fn default() -> Self {
        Self {
            id: 0,
            name: String::new(),
            address: None,
            city: None,
            territory: None,
            latitude: None,
            longitude: None,
            source: None,
            manufacturer: None,
            postcode: None,
            active: listed(),
        }
    }
}

/// A row of either collection.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    /// A merchant row.
    Merchant(Merchant),
    /// A cash-point row.
    Atm(CashPoint),
}

impl Record {
    /// The collection this record belongs to.
    #[must_use]
    pub fn collection(&self) -> Collection {
        match self {
            Self::Merchant(_) => Collection::Merchant,
            Self::Atm(_) => Collection::Atm,
        }
    }

    /// Display name of the row.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Merchant(m) => &m.name,
            Self::Atm(a) => &a.name,
        }
    }

    /// Encodes the payload (without collection tag) as CBOR.
    pub fn encode_payload(&self) -> CoreResult<Vec<u8>> {
        let mut buf = Vec::new();
        let result = match self {
            Self::Merchant(m) => ciborium::into_writer(m, &mut buf),
            Self::Atm(a) => ciborium::into_writer(a, &mut buf),
        };
        result.map_err(|e| CoreError::codec(e.to_string()))?;
        Ok(buf)
    }

    /// Decodes a CBOR payload for `collection`.
    pub fn decode_payload(collection: Collection, payload: &[u8]) -> CoreResult<Self> {
        match collection {
            Collection::Merchant => ciborium::from_reader(payload)
                .map(Self::Merchant)
                .map_err(|e| CoreError::codec(e.to_string())),
            Collection::Atm => ciborium::from_reader(payload)
                .map(Self::Atm)
                .map_err(|e| CoreError::codec(e.to_string())),
        }
    }
}

impl From<Merchant> for Record {
    fn from(merchant: Merchant) -> Self {
        Self::Merchant(merchant)
    }
}

impl From<CashPoint> for Record {
    fn from(atm: CashPoint) -> Self {
        Self::Atm(atm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_resolve() {
        for collection in Collection::ALL {
            assert_eq!(Collection::from_tag(collection.tag()), Some(collection));
        }
        assert_eq!(Collection::from_tag(0), None);
        assert_eq!(Collection::from_tag(9), None);
    }

    #[test]
    fn merchant_payload_roundtrip() {
        let record = Record::from(Merchant {
            id: 7,
            name: "Corner Coffee".into(),
            city: Some("Lisbon".into()),
            latitude: Some(38.72),
            longitude: Some(-9.14),
            payment_method: Some("dash".into()),
            active: true,
            ..Merchant::default()
        });

        let payload = record.encode_payload().unwrap();
        let decoded = Record::decode_payload(Collection::Merchant, &payload).unwrap();
        assert_eq!(decoded, record);
        assert_eq!(decoded.collection(), Collection::Merchant);
    }

    #[test]
    fn garbage_payload_is_codec_error() {
        let result = Record::decode_payload(Collection::Atm, &[0xff, 0x00, 0x13]);
        assert!(matches!(result, Err(CoreError::Codec { .. })));
    }

    #[test]
    fn missing_active_flag_matches_default() {
        let mut payload = Vec::new();
        let sparse = ciborium::Value::Map(vec![
            (ciborium::Value::from("id"), ciborium::Value::from(3)),
            (ciborium::Value::from("name"), ciborium::Value::from("Kiosk")),
        ]);
        ciborium::into_writer(&sparse, &mut payload).unwrap();

        let decoded = Record::decode_payload(Collection::Atm, &payload).unwrap();
        let expected = Record::from(CashPoint {
            id: 3,
            name: "Kiosk".into(),
            ..CashPoint::default()
        });
        assert_eq!(decoded, expected);
        assert!(CashPoint::default().active);
        assert!(Merchant::default().active);
    }
}
