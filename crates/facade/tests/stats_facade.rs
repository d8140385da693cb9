//! The configured facade over a SQLite file.

use entity_stats_domain::{ColumnKind, ScopeValue, TimingTable};
use entity_stats_facade::{ScopeFilter, StatFamily, Stats, StatsConfig, StatsDeps, TimingContext};
use entity_stats_shared::Result;
use entity_stats_testkit::{FixedClock, InMemoryStatsStore, RecordingLogger, TempDatabase, utc};
use std::sync::Arc;

fn sqlite_stats(db: &TempDatabase) -> Result<Stats> {
    let mut config = StatsConfig::default();
    config.store.path = db.path().to_path_buf();
    config.tenant.column = "team_id".into();
    let stats = Stats::from_config(&config.validate_and_normalize()?)?;
    Ok(stats.with_clock(Arc::new(FixedClock::at(utc(2025, 3, 1, 12, 0, 0)))))
}

#[tokio::test]
async fn counters_round_trip_through_the_configured_store() -> Result<()> {
    let db = TempDatabase::new("facade-counter");
    let stats = sqlite_stats(&db)?;
    let family = stats.tenant_family("member_stats", "user_id")?;
    stats.ensure_counter_table(&family).await?;

    let member = stats.counter(Arc::new(family), &42_i64).stat("comments")?;
    member.on(5_i64)?.increase(None, 3, None).await?;
    member.on(5_i64)?.increase(None, 2, None).await?;
    member.increase(None, 7, None).await?;

    assert_eq!(member.on(5_i64)?.value(None, None).await?, 5);
    assert_eq!(member.value(None, None).await?, 7);
    assert_eq!(
        member.on(5_i64)?.filter().get("team_id"),
        Some(Some(&ScopeValue::Integer(5)))
    );
    Ok(())
}

#[tokio::test]
async fn named_timings_use_the_configured_table() -> Result<()> {
    let db = TempDatabase::new("facade-timing");
    let stats = sqlite_stats(&db)?;
    stats.ensure_timing_table().await?;

    let report = stats.named_timing("ReportBuild")?;
    report
        .start("job-1", Some(utc(2025, 3, 1, 9, 0, 0)), TimingContext::new())
        .await?;
    let elapsed = report
        .end("job-1", Some(utc(2025, 3, 1, 9, 0, 2)), TimingContext::new())
        .await?;

    assert_eq!(elapsed, Some(2_000));
    assert_eq!(stats.timing_table().name().as_str(), "time_stats_events");
    assert_eq!(stats.timing_query(ScopeFilter::new()).count().await?, 1);
    Ok(())
}

#[tokio::test]
async fn attribute_writers_share_one_table() -> Result<()> {
    let store = Arc::new(InMemoryStatsStore::new());
    let logger = RecordingLogger::default();
    let deps = StatsDeps::new(store)
        .with_clock(Arc::new(FixedClock::at(utc(2025, 3, 1, 12, 0, 0))))
        .with_logger(Arc::new(logger.clone()));
    let config = StatsConfig::default().validate_and_normalize()?;
    let table = TimingTable::new("request_timings")?
        .with_column("route", ColumnKind::Text)?
        .with_column("user_id", ColumnKind::BigInt)?;
    let stats = Stats::from_deps(deps, &config)?.with_timing_table(table);
    stats.ensure_timing_table().await?;

    let home = ScopeFilter::from_pairs([("route", ScopeValue::from("/home"))])?
        .try_with("user_id", Some(ScopeValue::from(1_i64)))?;
    let search = ScopeFilter::from_pairs([("route", ScopeValue::from("/search"))])?
        .try_with("user_id", Some(ScopeValue::from(1_i64)))?;

    let earlier = Some(utc(2025, 3, 1, 11, 0, 0));
    stats
        .timing_writer(home.clone())
        .record(120, earlier, TimingContext::new())
        .await?;
    stats
        .timing_writer(search)
        .record(480, earlier, TimingContext::new())
        .await?;

    let by_user = ScopeFilter::from_pairs([("user_id", 1_i64)])?;
    assert_eq!(stats.timing_query(home).count().await?, 1);
    assert_eq!(stats.timing_query(by_user.clone()).count().await?, 2);
    assert_eq!(stats.timing_query(by_user).average().await?, 300);
    assert_eq!(logger.count("stats.timing.recorded"), 2);
    Ok(())
}

#[test]
fn tenant_family_uses_the_configured_column() -> Result<()> {
    let mut config = StatsConfig::default();
    config.tenant.column = "organization_id".into();
    let stats = Stats::from_deps(
        StatsDeps::new(Arc::new(InMemoryStatsStore::new())),
        &config.validate_and_normalize()?,
    )?;

    let family: StatFamily = stats.tenant_family("project_stats", "project_id")?;
    assert!(family.is_tenant_aware());
    assert_eq!(family.tenant_key().as_str(), "organization_id");
    Ok(())
}
