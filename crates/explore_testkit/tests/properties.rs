//! Property tests for promotion of generated datasets.

use explore_core::{encode_image, Collection, DatasetIdentity, Record, VersionConfig};
use explore_testkit::prelude::*;
use proptest::prelude::*;

fn counts(records: &[Record]) -> (u64, u64) {
    let merchants = records
        .iter()
        .filter(|r| r.collection() == Collection::Merchant)
        .count() as u64;
    (merchants, records.len() as u64 - merchants)
}

proptest! {
    #![proptest_config(PropTestConfig::quick().to_proptest_config())]

    #[test]
    fn promotion_finalizes_iff_both_collections_have_rows(
        records in dataset_strategy(24),
        timestamp in 1i64..i64::MAX,
    ) {
        let env = TestEnv::with_seed(1, 1);
        let previous = DatasetIdentity::from_timestamp(0);
        env.write_dataset(&previous, 1, 1);
        env.stage_bytes(&encode_image(timestamp, &records).unwrap());

        let harness = ControllerHarness::new(env);
        harness.version.set_active_identity(previous).unwrap();
        let handle = harness.controller.open().unwrap();

        let (merchants, atms) = counts(&records);
        let validation = handle.validation().unwrap();
        prop_assert_eq!(validation.merchant_count, merchants);
        prop_assert_eq!(validation.cash_point_count, atms);
        prop_assert_eq!(
            harness.source.finalize_calls(),
            usize::from(merchants > 0 && atms > 0)
        );
        prop_assert_eq!(
            harness.active_identity(),
            DatasetIdentity::from_timestamp(timestamp)
        );
        prop_assert!(!harness.env.staged_path().exists());
    }

    #[test]
    fn promoted_rows_read_back_in_order(records in dataset_strategy(16)) {
        let env = TestEnv::with_seed(1, 1);
        env.write_dataset(&DatasetIdentity::seed(), 1, 1);
        env.stage_bytes(&encode_image(42, &records).unwrap());

        let harness = ControllerHarness::new(env);
        let handle = harness.controller.open().unwrap();

        let expected: Vec<Record> = records
            .iter()
            .filter(|r| r.collection() == Collection::Atm)
            .cloned()
            .collect();
        let actual: Vec<Record> = handle
            .cash_points()
            .unwrap()
            .into_iter()
            .map(Record::from)
            .collect();
        prop_assert_eq!(actual, expected);
    }
}
