//! Property-based test generators using proptest.
//!
//! Provides strategies for generating merchant and cash-point rows and
//! whole datasets.

use explore_core::{CashPoint, Merchant, Record};
use proptest::prelude::*;

/// Strategy for display names.
pub fn name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Za-z][A-Za-z0-9 '&-]{0,39}").expect("Invalid regex")
}

fn optional_text() -> impl Strategy<Value = Option<String>> {
    prop::option::of(prop::string::string_regex("[A-Za-z0-9 ,.-]{1,40}").expect("Invalid regex"))
}

fn coordinates() -> impl Strategy<Value = (Option<f64>, Option<f64>)> {
    prop::option::of((-90.0f64..90.0, -180.0f64..180.0))
        .prop_map(|coords| coords.map_or((None, None), |(lat, lon)| (Some(lat), Some(lon))))
}

/// Strategy for merchant rows.
pub fn merchant_strategy() -> impl Strategy<Value = Merchant> {
    (
        any::<i64>(),
        name_strategy(),
        optional_text(),
        optional_text(),
        coordinates(),
        prop::option::of(prop_oneof![Just("dash"), Just("gift card")]),
        prop::option::of(prop_oneof![Just("physical"), Just("online"), Just("both")]),
        any::<bool>(),
    )
        .prop_map(
            |(id, name, address, city, (latitude, longitude), payment, kind, active)| Merchant {
                id,
                name,
                address,
                city,
                latitude,
                longitude,
                payment_method: payment.map(str::to_string),
                merchant_type: kind.map(str::to_string),
                active,
                ..Merchant::default()
            },
        )
}

/// Strategy for cash-point rows.
pub fn cash_point_strategy() -> impl Strategy<Value = CashPoint> {
    (
        any::<i64>(),
        name_strategy(),
        optional_text(),
        coordinates(),
        optional_text(),
        prop::option::of(prop::string::string_regex("[0-9]{4,5}").expect("Invalid regex")),
        any::<bool>(),
    )
        .prop_map(
            |(id, name, city, (latitude, longitude), manufacturer, postcode, active)| CashPoint {
                id,
                name,
                city,
                latitude,
                longitude,
                manufacturer,
                postcode,
                active,
                ..CashPoint::default()
            },
        )
}

/// Strategy for a row of either collection.
pub fn record_strategy() -> impl Strategy<Value = Record> {
    prop_oneof![
        merchant_strategy().prop_map(Record::from),
        cash_point_strategy().prop_map(Record::from),
    ]
}

/// Strategy for a dataset of up to `max_records` rows.
pub fn dataset_strategy(max_records: usize) -> impl Strategy<Value = Vec<Record>> {
    prop::collection::vec(record_strategy(), 0..=max_records)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests, suited to tests that touch
    /// the file system.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn names_are_searchable(name in name_strategy()) {
            prop_assert!(!name.is_empty());
            prop_assert!(name.chars().next().is_some_and(|c| c.is_ascii_alphabetic()));
        }

        #[test]
        fn coordinates_come_in_pairs(merchant in merchant_strategy()) {
            prop_assert_eq!(merchant.latitude.is_some(), merchant.longitude.is_some());
        }

        #[test]
        fn payloads_decode_to_the_same_row(record in record_strategy()) {
            let payload = record.encode_payload().unwrap();
            let decoded = Record::decode_payload(record.collection(), &payload).unwrap();
            prop_assert_eq!(decoded, record);
        }
    }
}
