//! Partition properties of complementary conditions.

mod common;

use common::*;
use proptest::prelude::*;
use quarry::{Engine, EntityBox, QueryBuilder};
use std::collections::BTreeSet;
use std::sync::Arc;

fn seed_readings(values: &[i64]) -> Arc<Engine> {
    let engine = open();
    let readings = EntityBox::<Reading>::new(&engine).unwrap();
    for (i, value) in values.iter().enumerate() {
        let mut reading = Reading {
            value_name: format!("r{i}"),
            value_integer: *value,
            value_int32: *value as i32,
            value_floating: *value as f64,
            ..Reading::default()
        };
        readings.put(&mut reading).unwrap();
    }
    engine
}

fn ids(engine: &Arc<Engine>, add: impl FnOnce(&mut QueryBuilder<Reading>)) -> BTreeSet<u64> {
    let mut builder = QueryBuilder::<Reading>::new(engine).unwrap();
    add(&mut builder);
    let query = builder.build_and_close().unwrap();
    query.find().unwrap().into_iter().map(|r| r.id).collect()
}

/// Flip the case of each character where that maps to a single character
/// with the same lowercase form.
fn case_variant(s: &str, upper: &[bool]) -> String {
    s.chars()
        .zip(upper.iter().cycle())
        .map(|(c, up)| {
            let mut mapped: Box<dyn Iterator<Item = char>> = if *up {
                Box::new(c.to_uppercase())
            } else {
                Box::new(c.to_lowercase())
            };
            match (mapped.next(), mapped.next()) {
                (Some(d), None) if d.to_lowercase().eq(c.to_lowercase()) => d,
                _ => c,
            }
        })
        .collect()
}

fn device_matches(device: &str, value: &str, case_sensitive: bool) -> usize {
    let engine = open();
    let events = EntityBox::<Event>::new(&engine).unwrap();
    let mut event = Event {
        device: device.to_owned(),
        uid: "only".into(),
        ..Event::default()
    };
    events.put(&mut event).unwrap();

    let mut builder = QueryBuilder::<Event>::new(&engine).unwrap();
    builder.string_eq(EVENT_DEVICE, value, case_sensitive);
    builder.build_and_close().unwrap().count().unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn string_eq_folds_every_case_variant(
        device in prop_oneof!["[a-zA-Z0-9 ]{0,12}", "[α-ωΑ-Ω ]{1,8}", "\\PC{0,12}"],
        upper in prop::collection::vec(any::<bool>(), 1..16),
    ) {
        let variant = case_variant(&device, &upper);

        prop_assert_eq!(device_matches(&device, &variant, false), 1);
        prop_assert_eq!(device_matches(&device, &device, true), 1);
        prop_assert_eq!(
            device_matches(&device, &variant, true),
            usize::from(variant == device)
        );
    }

    #[test]
    fn in_and_not_in_partition(
        values in prop::collection::vec(-50i64..50, 0..24),
        set in prop::collection::vec(-50i64..50, 0..6),
    ) {
        let engine = seed_readings(&values);
        let all = ids(&engine, |_| {});
        let inside = ids(&engine, |b| { b.int64_in(READING_LONG, &set); });
        let outside = ids(&engine, |b| { b.int64_not_in(READING_LONG, &set); });

        prop_assert!(inside.is_disjoint(&outside));
        prop_assert_eq!(inside.union(&outside).cloned().collect::<BTreeSet<_>>(), all);

        let set32: Vec<i32> = set.iter().map(|v| *v as i32).collect();
        let inside32 = ids(&engine, |b| { b.int32_in(READING_INT, &set32); });
        prop_assert_eq!(inside32, inside);
    }

    #[test]
    fn null_and_not_null_partition(present in prop::collection::vec(any::<bool>(), 0..16)) {
        let engine = open();
        let readings = EntityBox::<Reading>::new(&engine).unwrap();
        let events = put_events(&engine, 1);
        for (i, linked) in present.iter().enumerate() {
            let mut reading = Reading {
                value_name: format!("r{i}"),
                event_id: if *linked { events[0].id } else { 0 },
                ..Reading::default()
            };
            readings.put(&mut reading).unwrap();
        }

        let null = ids(&engine, |b| { b.is_null(READING_EVENT); });
        let not_null = ids(&engine, |b| { b.not_null(READING_EVENT); });

        prop_assert!(null.is_disjoint(&not_null));
        prop_assert_eq!(null.len() + not_null.len(), present.len());
        prop_assert_eq!(not_null.len(), present.iter().filter(|p| **p).count());
    }

    #[test]
    fn between_is_inclusive_range(
        values in prop::collection::vec(-100i64..100, 0..24),
        lo in -100i64..100,
        width in 0i64..50,
    ) {
        let engine = seed_readings(&values);
        let hi = lo + width;

        let between = ids(&engine, |b| { b.int_between(READING_LONG, lo, hi); });
        let bounded = ids(&engine, |b| {
            b.int_greater(READING_LONG, lo, true).int_less(READING_LONG, hi, true);
        });
        prop_assert_eq!(&between, &bounded);

        let expected = values.iter().filter(|v| (lo..=hi).contains(*v)).count();
        prop_assert_eq!(between.len(), expected);

        let doubles = ids(&engine, |b| { b.double_between(READING_DOUBLE, lo as f64, hi as f64); });
        prop_assert_eq!(doubles, between);
    }
}
