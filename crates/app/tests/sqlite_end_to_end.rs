//! Builders, writers and queries over a real SQLite file.

use chrono::TimeDelta;
use entity_stats_adapters::SqliteStatsStore;
use entity_stats_app::{NamedTimingStat, StatBuilder, StatsDeps, TimingQuery, named_timing_table};
use entity_stats_domain::{ScopeFilter, StatFamily, TenantRef, TimingContext};
use entity_stats_ports::{CounterEventStore, TimingEventStore};
use entity_stats_shared::Result;
use entity_stats_testkit::{FixedClock, RecordingLogger, TempDatabase, utc};
use std::sync::Arc;

struct Harness {
    _db: TempDatabase,
    store: SqliteStatsStore,
    clock: Arc<FixedClock>,
    logger: RecordingLogger,
    deps: StatsDeps,
}

async fn harness(label: &str) -> Result<Harness> {
    let db = TempDatabase::new(label);
    let store = SqliteStatsStore::new(db.path());
    let clock = Arc::new(FixedClock::at(utc(2025, 1, 2, 12, 0, 0)));
    let logger = RecordingLogger::default();
    let deps = StatsDeps::new(Arc::new(store.clone()))
        .with_clock(clock.clone())
        .with_logger(Arc::new(logger.clone()));
    store
        .ensure_timing_table(named_timing_table("time_stats_events")?)
        .await?;
    Ok(Harness {
        _db: db,
        store,
        clock,
        logger,
        deps,
    })
}

async fn family(store: &SqliteStatsStore, family: StatFamily) -> Result<Arc<StatFamily>> {
    store.ensure_counter_table(family.clone()).await?;
    Ok(Arc::new(family))
}

#[tokio::test]
async fn counter_value_is_reconstructed_from_set_and_changes() -> Result<()> {
    let harness = harness("e2e-reconstruct").await?;
    let users = family(&harness.store, StatFamily::new("user_stats", "user_id")?).await?;
    let stats = StatBuilder::for_owner(harness.deps.clone(), users, &7_i64).stat("logins")?;

    stats.increase(None, 5, Some(utc(2025, 1, 1, 9, 0, 0))).await?;
    stats.set(None, 100, Some(utc(2025, 1, 1, 10, 0, 0))).await?;
    stats.decrease(None, 3, Some(utc(2025, 1, 1, 11, 0, 0))).await?;
    stats.increase(None, 8, Some(utc(2025, 1, 2, 9, 0, 0))).await?;

    assert_eq!(stats.value(None, Some(utc(2025, 1, 1, 9, 30, 0))).await?, 5);
    assert_eq!(stats.value(None, Some(utc(2025, 1, 1, 12, 0, 0))).await?, 97);
    assert_eq!(stats.value(None, None).await?, 105);
    Ok(())
}

#[tokio::test]
async fn increase_then_decrease_leaves_the_value_unchanged() -> Result<()> {
    let harness = harness("e2e-inverse").await?;
    let users = family(&harness.store, StatFamily::new("user_stats", "user_id")?).await?;
    let stats = StatBuilder::for_owner(harness.deps.clone(), users, &1_i64);

    stats.set(Some("credits"), 40, None).await?;
    let before = stats.value(Some("credits"), None).await?;
    harness.clock.advance(TimeDelta::seconds(1));
    stats.increase(Some("credits"), 12, None).await?;
    stats.decrease(Some("credits"), 12, None).await?;

    assert_eq!(stats.value(Some("credits"), None).await?, before);
    Ok(())
}

#[tokio::test]
async fn daily_counter_series_has_two_buckets() -> Result<()> {
    let harness = harness("e2e-counter-series").await?;
    let users = family(&harness.store, StatFamily::new("user_stats", "user_id")?).await?;
    let stats = StatBuilder::for_owner(harness.deps.clone(), users, &3_i64).stat("orders")?;

    stats.increase(None, 10, Some(utc(2025, 1, 1, 8, 0, 0))).await?;
    stats.increase(None, 5, Some(utc(2025, 1, 2, 8, 0, 0))).await?;
    stats.decrease(None, 3, Some(utc(2025, 1, 2, 9, 0, 0))).await?;

    let series = stats
        .query(None)?
        .start(utc(2025, 1, 1, 0, 0, 0))
        .end(utc(2025, 1, 2, 12, 0, 0))
        .group_by_day()
        .get()
        .await?;

    assert_eq!(series.len(), 2);
    assert_eq!(series[0].value, 10);
    assert_eq!(series[0].increments, 10);
    assert_eq!(series[1].value, 12);
    assert_eq!(series[1].decrements, 3);
    assert_eq!(series[1].difference, 2);
    Ok(())
}

#[tokio::test]
async fn tenants_partition_one_owner() -> Result<()> {
    let harness = harness("e2e-tenants").await?;
    let members = family(
        &harness.store,
        StatFamily::new("member_stats", "user_id")?.tenant_aware(),
    )
    .await?;
    let stats = StatBuilder::for_owner(harness.deps.clone(), members, &9_i64).stat("posts")?;

    stats.on(1_i64)?.increase(None, 4, None).await?;
    stats.on(2_i64)?.increase(None, 6, None).await?;
    stats.on(TenantRef::none())?.increase(None, 1, None).await?;

    assert_eq!(stats.on(1_i64)?.value(None, None).await?, 4);
    assert_eq!(stats.on(2_i64)?.value(None, None).await?, 6);
    assert_eq!(stats.value(None, None).await?, 1);
    Ok(())
}

#[tokio::test]
async fn on_fails_for_plain_families_without_writing() -> Result<()> {
    let harness = harness("e2e-capability").await?;
    let users = family(&harness.store, StatFamily::new("user_stats", "user_id")?).await?;
    let stats = StatBuilder::for_owner(harness.deps.clone(), users.clone(), &5_i64);

    let error = stats.on(1_i64).expect_err("user_stats is not tenant-aware");
    assert_eq!(error.code.to_string(), "stats:capability_missing");

    let events = harness
        .store
        .list_counter_events(
            (*users).clone(),
            stats.filter(),
            entity_stats_domain::StatName::parse("anything")?,
            utc(2030, 1, 1, 0, 0, 0),
        )
        .await?;
    assert!(events.is_empty());
    Ok(())
}

#[tokio::test]
async fn owner_key_named_tenant_id_is_not_a_tenant_filter() -> Result<()> {
    let harness = harness("e2e-tenant-owner").await?;
    let tenants = family(&harness.store, StatFamily::new("tenant_stats", "tenant_id")?).await?;

    let first = StatBuilder::for_owner(harness.deps.clone(), tenants.clone(), &1_i64);
    let second = StatBuilder::for_owner(harness.deps.clone(), tenants, &2_i64);
    first.increase(Some("seats"), 3, None).await?;
    second.increase(Some("seats"), 8, None).await?;

    assert_eq!(first.filter().len(), 1);
    assert_eq!(first.value(Some("seats"), None).await?, 3);
    assert_eq!(second.value(Some("seats"), None).await?, 8);
    Ok(())
}

#[tokio::test]
async fn named_timing_lifecycle_and_rounding() -> Result<()> {
    let harness = harness("e2e-timing").await?;
    let table = named_timing_table("time_stats_events")?;
    let stat = NamedTimingStat::new(harness.deps.clone(), table, "ConversationResponse")?;

    assert_eq!(stat.end("conv-1", None, TimingContext::new()).await?, None);

    stat.start("conv-1", Some(utc(2025, 1, 2, 10, 0, 0)), TimingContext::new())
        .await?;
    stat.start("conv-1", Some(utc(2025, 1, 2, 10, 0, 10)), TimingContext::new())
        .await?;
    let newest = stat
        .end("conv-1", Some(utc(2025, 1, 2, 10, 0, 43)), TimingContext::new())
        .await?;
    assert_eq!(newest, Some(33_000));

    stat.record(33_333, Some(utc(2025, 1, 2, 11, 0, 0)), TimingContext::new())
        .await?;
    stat.record(33_333, Some(utc(2025, 1, 2, 11, 5, 0)), TimingContext::new())
        .await?;

    let query = stat
        .query()
        .start(utc(2025, 1, 2, 11, 0, 0))
        .end(utc(2025, 1, 2, 12, 0, 0))
        .group_by_hour();
    let points = query.get().await?;

    assert_eq!(points.len(), 1);
    assert_eq!(points[0].average_duration_ms, 33_333);
    assert!((points[0].average_seconds - 33.33).abs() < 1e-9);
    assert!((points[0].average_minutes - 0.56).abs() < 1e-9);
    assert_eq!(harness.logger.count("stats.timing.unmatched"), 1);
    assert_eq!(harness.logger.count("stats.timing.completed"), 1);
    Ok(())
}

#[tokio::test]
async fn attribute_queries_narrow_and_broaden() -> Result<()> {
    let harness = harness("e2e-attributes").await?;
    let table = named_timing_table("time_stats_events")?;
    let import = NamedTimingStat::new(harness.deps.clone(), table.clone(), "Import")?;

    let earlier = Some(utc(2025, 1, 2, 11, 0, 0));
    import.record(100, earlier, TimingContext::new()).await?;
    import.record(300, earlier, TimingContext::new()).await?;
    NamedTimingStat::new(harness.deps.clone(), table.clone(), "Export")?
        .record(900, earlier, TimingContext::new())
        .await?;

    let narrow = import.query();
    let broad = TimingQuery::new(harness.deps.clone(), table, ScopeFilter::new());

    assert_eq!(narrow.count().await?, 2);
    assert_eq!(narrow.average().await?, 200);
    assert_eq!(broad.count().await?, 3);
    assert_eq!(broad.max().await?, 900);
    Ok(())
}

#[tokio::test]
async fn instants_inside_one_millisecond_keep_their_order() -> Result<()> {
    let harness = harness("e2e-sub-millisecond").await?;
    let base = utc(2025, 1, 2, 11, 0, 0);
    let table = named_timing_table("time_stats_events")?;
    let sync = NamedTimingStat::new(harness.deps.clone(), table, "Sync")?;

    sync.record(15, Some(base + TimeDelta::microseconds(400)), TimingContext::new())
        .await?;
    let within = sync.query().start(base).end(base + TimeDelta::microseconds(800));
    let before = sync.query().start(base).end(base + TimeDelta::microseconds(400));
    assert_eq!(within.count().await?, 1);
    assert_eq!(before.count().await?, 0);

    let users = family(&harness.store, StatFamily::new("user_stats", "user_id")?).await?;
    let stats = StatBuilder::for_owner(harness.deps.clone(), users, &9_i64).stat("syncs")?;
    stats.set(None, 50, Some(base + TimeDelta::microseconds(400))).await?;

    let early = base + TimeDelta::microseconds(100);
    assert_eq!(stats.value(None, Some(early)).await?, 0);
    assert_eq!(stats.value(None, Some(base + TimeDelta::microseconds(400))).await?, 50);
    assert_eq!(stats.value(None, Some(base + TimeDelta::nanoseconds(400_900))).await?, 50);
    Ok(())
}
