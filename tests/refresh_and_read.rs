// tests/refresh_and_read.rs
//! End-to-end behaviour of the refresh cycle and the read path over the in-memory store.

use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use tao_dividend_cache::{
    cache::{CacheStore, MemoryCache},
    config::Config,
    refresh::{RefreshOutcome, TickOutcome},
    resolver::DividendQuery,
    testing::MockChain,
    ChainReference, DividendError, DividendRecord, RefreshStatus, Services,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn services(chain: &MockChain) -> (Services, Arc<MemoryCache>) {
    init_logging();
    let store = Arc::new(MemoryCache::new());
    let services = Services::build(&Config::default(), store.clone(), Arc::new(chain.clone()))
        .expect("services build");
    (services, store)
}

#[tokio::test]
async fn reads_after_refresh_see_the_refreshed_generation() {
    let chain = MockChain::new("0xgen1")
        .with_one_record_per_subnet(1..=50)
        .with_subnet(18, vec![("5A", 1), ("5B", 2)]);
    let (services, _) = services(&chain);

    let outcome = services.coordinator.refresh_all().await.unwrap();
    assert_eq!(outcome.processed_count(), 51);

    // Every record of the generation is served from cache without touching the chain.
    assert_eq!(services.resolver.get_one(18, "5B").await.unwrap(), (2, true));
    assert_eq!(services.resolver.get_one(50, "hotkey-50").await.unwrap(), (500, true));
    assert_eq!(chain.stats().point_calls, 0);

    let listing = services.resolver.list_all().await.unwrap();
    assert!(listing.cached);
    assert_eq!(listing.block_reference, Some(ChainReference::new("0xgen1")));
    assert_eq!(listing.records.len(), 51);

    let DividendQuery::Many(subnet) = services.resolver.get_range(Some(18), None).await.unwrap() else {
        panic!("expected a subnet listing");
    };
    assert_eq!(
        subnet.records,
        vec![DividendRecord::new(18, "5A", 1), DividendRecord::new(18, "5B", 2)]
    );
}

#[tokio::test]
async fn a_new_generation_replaces_the_reference() {
    let chain = MockChain::new("0xgen1").with_subnet(2, vec![("5A", 10)]);
    let (services, _) = services(&chain);
    services.coordinator.refresh_all().await.unwrap();

    chain.set_reference("0xgen2");
    chain.set_subnet(2, vec![("5A".to_string(), 11)]);
    let RefreshOutcome::Completed(report) = services.coordinator.refresh_all().await.unwrap() else {
        panic!("second refresh should run");
    };

    assert_eq!(report.reference, ChainReference::new("0xgen2"));
    assert_eq!(services.resolver.get_one(2, "5A").await.unwrap(), (11, true));
    assert_eq!(
        services.resolver.status().await.unwrap().status,
        RefreshStatus::Completed
    );
}

#[tokio::test(start_paused = true)]
async fn entries_expire_after_the_ttl() {
    let chain = MockChain::new("0xgen1").with_subnet(9, vec![("5A", 90)]);
    let (services, store) = services(&chain);
    services.coordinator.refresh_all().await.unwrap();
    assert!(!store.is_empty());

    tokio::time::sleep(Duration::from_secs(239)).await;
    assert_eq!(services.resolver.get_one(9, "5A").await.unwrap(), (90, true));

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(store.get("tao_dividend:9:5A").await.unwrap(), None);
    assert_eq!(store.get("tao_dividend:block_hash").await.unwrap(), None);
    assert_eq!(
        services.resolver.status().await.unwrap().status,
        RefreshStatus::NotStarted
    );
}

#[tokio::test(start_paused = true)]
async fn stuck_in_progress_status_heals_when_it_expires() {
    let chain = MockChain::new("0xgen1").with_subnet(1, vec![("5A", 1)]);
    let (services, _) = services(&chain);
    services
        .coordinator
        .cache()
        .put_status(RefreshStatus::InProgress)
        .await
        .unwrap();

    assert!(matches!(
        services.coordinator.refresh_all().await.unwrap(),
        RefreshOutcome::Skipped
    ));

    tokio::time::sleep(Duration::from_secs(241)).await;
    assert_eq!(services.coordinator.refresh_all().await.unwrap().processed_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn scheduled_tick_survives_exhausted_retries() {
    let chain = MockChain::new("0xgen1").with_subnet(1, vec![("5A", 1)]);
    chain.set_fail_connect(true);
    let (services, _) = services(&chain);

    let outcome = services.scheduler().run_tick().await;
    assert!(matches!(outcome, TickOutcome::Failed(_)));
    assert_eq!(chain.stats().connects, 4);

    chain.set_fail_connect(false);
    assert!(matches!(
        services.scheduler().run_tick().await,
        TickOutcome::Completed(1)
    ));
}

#[tokio::test]
async fn point_miss_writes_exactly_one_entry() {
    let chain = MockChain::new("0xhead").with_point(18, "5FFApaS75bv5pJHfAp2FVLBj9ZaXuFDjEypsaBNc1wCfe52v", 250);
    let (services, store) = services(&chain);

    let DividendQuery::Single(point) = services.resolver.get_range(None, None).await.unwrap() else {
        panic!("expected the default point lookup");
    };
    assert_eq!((point.netuid, point.dividend, point.cached), (18, 250, false));
    assert_eq!(store.len(), 1);
    assert_eq!(chain.stats().point_calls, 1);

    let err = services.resolver.get_one(99, "x").await.unwrap_err();
    assert!(matches!(err, DividendError::InvalidInput(_)));
    assert_eq!(chain.stats().connects, 1);
}
