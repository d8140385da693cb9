//! SQLite store against real database files.

use chrono::{TimeDelta, Utc};
use entity_stats_adapters::SqliteStatsStore;
use entity_stats_domain::{
    ColumnKind, CounterEventKind, Granularity, NewCounterEvent, NewTimingEvent, ScopeFilter,
    ScopeValue, StatFamily, StatName, TimingContext, TimingEventKind, TimingIdentifier,
    TimingTable, generate_periods,
};
use entity_stats_ports::{CounterEventStore, TimeRange, TimingEventStore};
use entity_stats_shared::Result;
use entity_stats_testkit::{TempDatabase, utc};
use serde_json::json;

fn timing_table() -> Result<TimingTable> {
    Ok(TimingTable::new("time_stats_events")?
        .with_column("name", ColumnKind::Text)?
        .with_column("user_id", ColumnKind::BigInt)?)
}

fn named(name: &str) -> Result<ScopeFilter> {
    Ok(ScopeFilter::from_pairs([("name", name)])?)
}

#[tokio::test]
async fn counter_events_round_trip_with_cursor_ordering() -> Result<()> {
    let db = TempDatabase::new("sqlite-counter");
    let store = SqliteStatsStore::new(db.path());
    let family = StatFamily::new("tenant_stats", "user_id")?.tenant_aware();
    let scope = ScopeFilter::from_pairs([("user_id", 7_i64)])?
        .try_with("tenant_id", Some(ScopeValue::Integer(2)))?;
    let name = StatName::parse("logins")?;
    store.ensure_counter_table(family.clone()).await?;
    store.ensure_counter_table(family.clone()).await?;

    let at = utc(2025, 1, 1, 12, 0, 0) + TimeDelta::milliseconds(250);
    let event = |kind, value| NewCounterEvent {
        name: name.clone(),
        kind,
        value,
        recorded_at: at,
    };

    store
        .insert_counter_event(family.clone(), scope.clone(), event(CounterEventKind::Change, 4))
        .await?;
    let set = store
        .insert_counter_event(family.clone(), scope.clone(), event(CounterEventKind::Set, 10))
        .await?;
    store
        .insert_counter_event(family.clone(), scope.clone(), event(CounterEventKind::Change, 3))
        .await?;

    let latest = store
        .latest_set(family.clone(), scope.clone(), name.clone(), at)
        .await?
        .expect("set is visible at its own timestamp");
    assert_eq!(latest.id, set.id);
    assert_eq!(latest.recorded_at, at);

    let after_set = store
        .sum_changes(family.clone(), scope.clone(), name.clone(), Some(latest.cursor()), at)
        .await?;
    assert_eq!(after_set, 3);

    let other_tenant = ScopeFilter::from_pairs([("user_id", 7_i64)])?
        .try_with("tenant_id", None::<ScopeValue>)?;
    assert!(
        store
            .latest_set(family.clone(), other_tenant, name.clone(), at)
            .await?
            .is_none()
    );

    let listed = store
        .list_counter_events(family, scope, name, at + TimeDelta::seconds(1))
        .await?;
    let kinds: Vec<CounterEventKind> = listed.iter().map(|event| event.kind).collect();
    assert_eq!(
        kinds,
        vec![CounterEventKind::Change, CounterEventKind::Set, CounterEventKind::Change]
    );
    Ok(())
}

#[tokio::test]
async fn open_starts_close_and_keep_their_context() -> Result<()> {
    let db = TempDatabase::new("sqlite-timing");
    let store = SqliteStatsStore::new(db.path());
    let table = timing_table()?;
    let scope = named("ConversationResponse")?;
    let identifier = TimingIdentifier::parse("conv-1")?;
    store.ensure_timing_table(table.clone()).await?;

    let started_at = utc(2025, 1, 1, 9, 0, 0);
    let context = json!({"model": "small"}).as_object().cloned().unwrap_or_default();
    let start = store
        .insert_timing_event(
            table.clone(),
            NewTimingEvent::start(scope.clone(), identifier.clone(), started_at, context),
        )
        .await?;

    let open = store
        .find_open_start(table.clone(), scope.clone(), identifier.clone())
        .await?
        .expect("start is open");
    assert_eq!(open.id, start.id);
    assert_eq!(open.context, start.context);

    let ended_at = started_at + TimeDelta::milliseconds(1_250);
    store
        .insert_timing_event(
            table.clone(),
            NewTimingEvent::completed_from(scope.clone(), &open, ended_at, TimingContext::new()),
        )
        .await?;
    store.close_start(table.clone(), open.id, ended_at).await?;

    assert!(
        store
            .find_open_start(table.clone(), scope.clone(), identifier)
            .await?
            .is_none()
    );

    let rows = store.list_timing_events(table, scope).await?;
    assert_eq!(rows.len(), 2);
    let completed = rows
        .iter()
        .find(|row| row.kind == TimingEventKind::Completed)
        .expect("completed row");
    assert_eq!(completed.duration_ms, Some(1_250));
    assert_eq!(completed.ended_at, Some(ended_at));
    assert_eq!(completed.context.as_ref().and_then(|ctx| ctx.get("model")), Some(&json!("small")));
    Ok(())
}

#[tokio::test]
async fn week_keys_agree_with_the_period_generator() -> Result<()> {
    let db = TempDatabase::new("sqlite-weeks");
    let store = SqliteStatsStore::new(db.path());
    let table = timing_table()?;
    let scope = named("Import")?;
    store.ensure_timing_table(table.clone()).await?;

    // Dec 29 2020 is ISO week 2020-53; Jan 4 2021 starts 2021-01.
    let samples = [
        utc(2020, 12, 29, 10, 0, 0),
        utc(2021, 1, 2, 10, 0, 0),
        utc(2021, 1, 5, 10, 0, 0),
    ];
    for at in samples {
        store
            .insert_timing_event(
                table.clone(),
                NewTimingEvent::recorded(scope.clone(), 100, at, TimingContext::new()),
            )
            .await?;
    }

    let range = TimeRange {
        start: utc(2020, 12, 28, 0, 0, 0),
        end: utc(2021, 1, 11, 0, 0, 0),
    };
    let mut grouped = store
        .aggregate_by_period(table, scope, range, Granularity::Week)
        .await?;
    grouped.sort_by(|left, right| left.key.cmp(&right.key));

    let periods = generate_periods(range.start, range.end, Granularity::Week);
    let keys: Vec<&str> = periods.iter().map(|period| period.key.as_str()).collect();
    assert_eq!(keys, vec!["202053", "202101"]);

    let grouped_keys: Vec<&str> = grouped.iter().map(|row| row.key.as_str()).collect();
    assert_eq!(grouped_keys, keys);
    assert_eq!(grouped[0].count, 2);
    assert_eq!(grouped[1].count, 1);
    Ok(())
}

#[tokio::test]
async fn totals_are_zero_for_empty_windows_and_scoped_otherwise() -> Result<()> {
    let db = TempDatabase::new("sqlite-totals");
    let store = SqliteStatsStore::new(db.path());
    let table = timing_table()?;
    store.ensure_timing_table(table.clone()).await?;

    let now = Utc::now();
    let range = TimeRange {
        start: now - TimeDelta::hours(1),
        end: now + TimeDelta::hours(1),
    };
    let empty = store
        .aggregate_totals(table.clone(), named("Import")?, range)
        .await?;
    assert_eq!(empty.count, 0);
    assert_eq!(empty.max_ms, 0);

    let user_one = named("Import")?.try_with("user_id", Some(ScopeValue::Integer(1)))?;
    let user_two = named("Import")?.try_with("user_id", Some(ScopeValue::Integer(2)))?;
    for (scope, duration) in [(&user_one, 100), (&user_two, 300), (&user_two, 500)] {
        store
            .insert_timing_event(
                table.clone(),
                NewTimingEvent::recorded(scope.clone(), duration, now, TimingContext::new()),
            )
            .await?;
    }

    let narrow = store.aggregate_totals(table.clone(), user_two, range).await?;
    assert_eq!(narrow.count, 2);
    assert_eq!(narrow.min_ms, 300);
    assert!((narrow.average_ms - 400.0).abs() < f64::EPSILON);

    let broad = store.aggregate_totals(table, named("Import")?, range).await?;
    assert_eq!(broad.count, 3);
    assert_eq!(broad.total_ms, 900);
    Ok(())
}

#[tokio::test]
async fn missing_tables_surface_as_sqlite_store_errors() -> Result<()> {
    let db = TempDatabase::new("sqlite-missing");
    let store = SqliteStatsStore::new(db.path());

    let error = store
        .aggregate_totals(
            timing_table()?,
            named("Import")?,
            TimeRange {
                start: utc(2025, 1, 1, 0, 0, 0),
                end: utc(2025, 1, 2, 0, 0, 0),
            },
        )
        .await
        .expect_err("table was never created");
    assert_eq!(error.code.to_string(), "store:sqlite");
    Ok(())
}
