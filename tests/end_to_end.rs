//! Full-stack tests against the public `tsdb` facade: a store opened on
//! a temp directory, driven purely through `Store`'s API.

use tempfile::tempdir;
use tsdb::{Aggregate, AggregateSet, LabelSet, Matcher, Store, StoreConfig, TierSpec};

fn config_with(data_dir: &std::path::Path, shards: usize, segment_duration: i64) -> StoreConfig {
    let mut config = StoreConfig::with_defaults(data_dir);
    config.shards = shards;
    config.segment_duration = segment_duration;
    config.schema = vec![TierSpec {
        name: "hourly".into(),
        resolution_seconds: 3_600,
        aggregates: AggregateSet::all(),
        chunk_seconds: 24 * 3_600,
        retention_seconds: Some(30 * 86_400),
    }];
    config
}

#[test]
fn basic_round_trip_write_then_query() {
    let dir = tempdir().unwrap();
    let store = Store::open(config_with(dir.path(), 1, 14_400)).unwrap();
    let labels = LabelSet::new([("host", "a")]);

    store.write("cpu", &labels, 10.0, 1_700_000_000, 1_700_000_000).unwrap();
    store.write("cpu", &labels, 20.0, 1_700_000_060, 1_700_000_060).unwrap();

    let points = store.query_instant("cpu", &[Matcher::eq("host", "a")], None).unwrap();
    assert_eq!(points.len(), 1);
    assert_eq!(points[0].ts, 1_700_000_060);
    assert_eq!(points[0].value, 20.0);

    let series = store
        .query_range("cpu", &[Matcher::eq("host", "a")], 1_700_000_000, 1_700_000_120, 1, Aggregate::Last, 1_700_000_100)
        .unwrap();
    assert_eq!(series.len(), 2);
    assert_eq!(series, vec![(1_700_000_000, 10.0), (1_700_000_060, 20.0)]);

    store.shutdown();
}

#[test]
fn hourly_rollup_produces_expected_average() {
    let dir = tempdir().unwrap();
    // A 1-hour window means the batch below seals a full raw segment as
    // soon as the trailing point past it arrives. Timestamps start one
    // window in (rather than at the epoch) since `ts` must be positive.
    const WINDOW_START: i64 = 3_600;
    let store = Store::open(config_with(dir.path(), 1, 3_600)).unwrap();
    let labels = LabelSet::new([("host", "a")]);

    for ts in WINDOW_START..WINDOW_START + 3_600 {
        store.write("cpu", &labels, (ts % 100) as f64, ts, 0).unwrap();
    }
    // Past the window boundary: forces the window to seal.
    store.write("cpu", &labels, 0.0, WINDOW_START + 3_600, WINDOW_START + 3_600).unwrap();

    let stats = store.run_rollup_now(WINDOW_START + 3_700);
    assert!(stats.iter().any(|s| s.series_rolled_up > 0));

    let series = store
        .query_range(
            "cpu",
            &[Matcher::eq("host", "a")],
            WINDOW_START,
            WINDOW_START + 3_600,
            3_600,
            Aggregate::Avg,
            WINDOW_START + 3_700,
        )
        .unwrap();
    assert_eq!(series.len(), 1);
    let (bucket_start, avg) = series[0];
    assert_eq!(bucket_start, WINDOW_START);
    assert!((avg - 49.5).abs() < 1e-9, "avg was {avg}");

    store.shutdown();
}

#[test]
fn retention_drops_raw_segment_but_keeps_rollup() {
    let dir = tempdir().unwrap();
    const WINDOW_START: i64 = 3_600;
    let mut config = config_with(dir.path(), 1, 3_600);
    config.raw_retention_seconds = 1_000;
    let store = Store::open(config).unwrap();
    let labels = LabelSet::new([("host", "a")]);

    for ts in WINDOW_START..WINDOW_START + 3_600 {
        store.write("cpu", &labels, (ts % 100) as f64, ts, 0).unwrap();
    }
    store.write("cpu", &labels, 0.0, WINDOW_START + 3_600, WINDOW_START + 3_600).unwrap();

    store.run_rollup_now(WINDOW_START + 3_700);
    let before = store.info().unwrap();
    assert!(before.points_estimate > 0);

    let sweep = store.run_retention_now(1_000_000);
    assert!(sweep.iter().any(|s| s.segments_deleted > 0));

    let after = store.info().unwrap();
    assert_eq!(after.points_estimate, 0, "raw points should be gone after the sweep");

    // The hourly rollup survives: its own retention horizon (30 days)
    // is untouched by the raw cutoff above.
    let series = store
        .query_range(
            "cpu",
            &[Matcher::eq("host", "a")],
            WINDOW_START,
            WINDOW_START + 3_600,
            3_600,
            Aggregate::Avg,
            1_000_000,
        )
        .unwrap();
    assert_eq!(series.len(), 1);
    assert!((series[0].1 - 49.5).abs() < 1e-9);

    store.shutdown();
}

#[test]
fn crash_recovery_replays_wal_into_pending() {
    let dir = tempdir().unwrap();
    let labels = LabelSet::new([("host", "a")]);
    const START: i64 = 1;

    {
        let store = Store::open(config_with(dir.path(), 1, 14_400)).unwrap();
        for ts in START..START + 50 {
            store.write("cpu", &labels, ts as f64, ts, ts).unwrap();
        }
        // Forces a WAL checkpoint of everything still pending, simulating
        // a clean shutdown ahead of a restart.
        store.shutdown();
    }

    let store = Store::open(config_with(dir.path(), 1, 14_400)).unwrap();
    let series = store
        .query_range("cpu", &[Matcher::eq("host", "a")], START, START + 50, 1, Aggregate::Last, START + 50)
        .unwrap();
    assert_eq!(series.len(), 50);
    for (ts, value) in &series {
        assert_eq!(*value, *ts as f64);
    }
    store.shutdown();
}

#[test]
fn sharding_spreads_series_across_every_shard() {
    let dir = tempdir().unwrap();
    let store = Store::open(config_with(dir.path(), 4, 14_400)).unwrap();

    for i in 0..200 {
        let labels = LabelSet::new([("host", format!("h{i}"))]);
        store.write("cpu", &labels, i as f64, 1_700_000_000, 1_700_000_000).unwrap();
    }

    let info = store.info().unwrap();
    assert_eq!(info.series_count, 200);
    assert_eq!(info.storage_bytes_by_shard.len(), 4);
    assert_eq!(info.tier_watermarks.len(), 4);
    assert_eq!(store.list_series("cpu").len(), 200);

    store.shutdown();
}
