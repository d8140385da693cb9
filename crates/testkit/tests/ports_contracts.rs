//! Contract-style tests for the store ports using the in-memory adapter.

use chrono::TimeDelta;
use entity_stats_domain::{
    CounterEventKind, Granularity, NewCounterEvent, NewTimingEvent, ScopeFilter, ScopeValue,
    StatFamily, StatName, TimingContext, TimingIdentifier, TimingTable,
};
use entity_stats_ports::{CounterEventStore, TimeRange, TimingEventStore};
use entity_stats_shared::{ErrorEnvelope, Result};
use entity_stats_testkit::{InMemoryStatsStore, utc};

fn family() -> Result<StatFamily> {
    Ok(StatFamily::new("user_stats", "user_id")?)
}

fn owner(id: i64) -> Result<ScopeFilter> {
    Ok(ScopeFilter::from_pairs([("user_id", id)])?)
}

fn change(name: &StatName, value: i64, minute: u32) -> NewCounterEvent {
    NewCounterEvent {
        name: name.clone(),
        kind: CounterEventKind::Change,
        value,
        recorded_at: utc(2025, 1, 1, 12, minute, 0),
    }
}

#[tokio::test]
async fn counter_store_contract_smoke() -> Result<()> {
    let store = InMemoryStatsStore::new();
    let family = family()?;
    let name = StatName::parse("logins")?;
    store.ensure_counter_table(family.clone()).await?;

    store
        .insert_counter_event(family.clone(), owner(1)?, change(&name, 5, 0))
        .await?;
    let set = store
        .insert_counter_event(
            family.clone(),
            owner(1)?,
            NewCounterEvent {
                kind: CounterEventKind::Set,
                ..change(&name, 100, 10)
            },
        )
        .await?;
    store
        .insert_counter_event(family.clone(), owner(1)?, change(&name, -3, 20))
        .await?;
    store
        .insert_counter_event(family.clone(), owner(2)?, change(&name, 7, 20))
        .await?;

    let as_of = utc(2025, 1, 1, 13, 0, 0);
    let latest = store
        .latest_set(family.clone(), owner(1)?, name.clone(), as_of)
        .await?;
    assert_eq!(latest.as_ref().map(|event| event.id), Some(set.id));

    let changes = store
        .sum_changes(family.clone(), owner(1)?, name.clone(), Some(set.cursor()), as_of)
        .await?;
    assert_eq!(changes, -3);

    let all_changes = store
        .sum_changes(family.clone(), owner(1)?, name.clone(), None, as_of)
        .await?;
    assert_eq!(all_changes, 2);

    let listed = store
        .list_counter_events(family, owner(1)?, name, utc(2025, 1, 1, 12, 15, 0))
        .await?;
    assert_eq!(listed.len(), 2);
    assert!(listed.windows(2).all(|pair| pair[0].cursor() < pair[1].cursor()));

    Ok(())
}

#[tokio::test]
async fn timing_store_contract_smoke() -> Result<()> {
    let store = InMemoryStatsStore::new();
    let table = TimingTable::new("time_stats_events")?;
    let scope = ScopeFilter::from_pairs([("name", "import")])?;
    let identifier = TimingIdentifier::parse("job-1")?;
    store.ensure_timing_table(table.clone()).await?;

    let started_at = utc(2025, 1, 1, 9, 0, 0);
    let start = store
        .insert_timing_event(
            table.clone(),
            NewTimingEvent::start(
                scope.clone(),
                identifier.clone(),
                started_at,
                TimingContext::new(),
            ),
        )
        .await?;

    let open = store
        .find_open_start(table.clone(), scope.clone(), identifier.clone())
        .await?;
    assert_eq!(open.as_ref().map(|event| event.id), Some(start.id));

    let ended_at = started_at + TimeDelta::milliseconds(1_500);
    store
        .insert_timing_event(
            table.clone(),
            NewTimingEvent::completed_from(scope.clone(), &start, ended_at, TimingContext::new()),
        )
        .await?;
    store.close_start(table.clone(), start.id, ended_at).await?;

    assert!(
        store
            .find_open_start(table.clone(), scope.clone(), identifier)
            .await?
            .is_none()
    );

    let range = TimeRange {
        start: utc(2025, 1, 1, 0, 0, 0),
        end: utc(2025, 1, 2, 0, 0, 0),
    };
    let grouped = store
        .aggregate_by_period(table.clone(), scope.clone(), range, Granularity::Hour)
        .await?;
    assert_eq!(grouped.len(), 1);
    assert_eq!(grouped[0].key, "2025-01-01 09");
    assert_eq!(grouped[0].total_ms, 1_500);

    let totals = store.aggregate_totals(table.clone(), scope.clone(), range).await?;
    assert_eq!(totals.count, 1);
    assert_eq!(totals.max_ms, 1_500);

    let rows = store.list_timing_events(table, scope).await?;
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|row| row.ended_at == Some(ended_at)));

    Ok(())
}

#[tokio::test]
async fn scope_filters_isolate_rows_and_null_matches_missing_columns() -> Result<()> {
    let store = InMemoryStatsStore::new();
    let table = TimingTable::new("time_stats_events")?;
    let at = utc(2025, 1, 1, 9, 0, 0);

    let tagged = ScopeFilter::from_pairs([("name", "import")])?
        .try_with("tenant_id", ScopeValue::Integer(4))?;
    let untagged = ScopeFilter::from_pairs([("name", "import")])?;
    store
        .insert_timing_event(
            table.clone(),
            NewTimingEvent::recorded(tagged.clone(), 10, at, TimingContext::new()),
        )
        .await?;
    store
        .insert_timing_event(
            table.clone(),
            NewTimingEvent::recorded(untagged, 30, at, TimingContext::new()),
        )
        .await?;

    let range = TimeRange {
        start: at,
        end: at + TimeDelta::hours(1),
    };
    let broad = ScopeFilter::from_pairs([("name", "import")])?;
    let null_tenant = broad.clone().try_with("tenant_id", None::<ScopeValue>)?;

    assert_eq!(store.aggregate_totals(table.clone(), broad, range).await?.count, 2);
    assert_eq!(store.aggregate_totals(table.clone(), tagged, range).await?.total_ms, 10);
    assert_eq!(store.aggregate_totals(table, null_tenant, range).await?.total_ms, 30);

    Ok(())
}

#[tokio::test]
async fn injected_failures_surface_as_store_errors() -> Result<()> {
    let store = InMemoryStatsStore::new();
    store
        .fail_with(ErrorEnvelope::store("memory", "memory store offline"))
        .await;

    let result = store
        .latest_set(family()?, owner(1)?, StatName::parse("logins")?, utc(2025, 1, 1, 0, 0, 0))
        .await;
    assert!(matches!(result, Err(ref error) if error.code.namespace() == "store"));

    Ok(())
}
