//! Tests for persistence module

use super::*;
use crate::config::{BigQueryConfig, PersistenceConfig};
use crate::error::Error;
use crate::usage::{InteractionKind, UsageMetrics, UsageReport};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

fn reports(n: usize) -> Vec<UsageReport> {
    (0..n)
        .map(|i| {
            UsageReport::new(
                format!("model-{i}"),
                UsageMetrics::new(1, 1, 0, 0, 2),
                InteractionKind::Primary,
            )
        })
        .collect()
}

// ============================================================================
// Service
// ============================================================================

#[tokio::test]
async fn test_save_empty_batch_skips_provider() {
    let mut mock = MockPersistenceProvider::new();
    mock.expect_name().return_const("mock");
    mock.expect_persist_batch().never();

    let service = PersistenceService::new(Arc::new(mock));
    let outcome = service.save_reports_batch(&[]).await;

    assert_eq!(outcome, BatchOutcome::default());
}

#[tokio::test]
async fn test_save_passes_through_outcome() {
    let mut mock = MockPersistenceProvider::new();
    mock.expect_name().return_const("mock");
    mock.expect_persist_batch()
        .times(1)
        .withf(|batch| batch.len() == 3)
        .returning(|batch| {
            Ok(BatchOutcome {
                attempted: batch.len(),
                inserted: batch.len() - 1,
                row_errors: vec![RowError {
                    index: 1,
                    reason: "invalid".to_string(),
                }],
            })
        });

    let service = PersistenceService::new(Arc::new(mock));
    let outcome = service.save_reports_batch(&reports(3)).await;

    assert_eq!(outcome.inserted, 2);
    assert_eq!(outcome.row_errors[0].index, 1);
}

#[tokio::test]
async fn test_save_absorbs_provider_error() {
    let mut mock = MockPersistenceProvider::new();
    mock.expect_name().return_const("mock");
    mock.expect_persist_batch()
        .times(1)
        .returning(|_| Err(Error::Persistence("backend down".to_string())));

    let service = PersistenceService::new(Arc::new(mock));
    let outcome = service.save_reports_batch(&reports(2)).await;

    assert_eq!(outcome.attempted, 2);
    assert_eq!(outcome.inserted, 0);
}

// ============================================================================
// Lazy cell
// ============================================================================

fn counting_cell(calls: Arc<AtomicUsize>) -> LazyPersistence {
    LazyPersistence::new(move || {
        let calls = Arc::clone(&calls);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            let mut mock = MockPersistenceProvider::new();
            mock.expect_name().return_const("mock");
            Some(PersistenceService::new(Arc::new(mock)))
        }
    })
}

#[tokio::test]
async fn test_lazy_builds_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let lazy = counting_cell(Arc::clone(&calls));

    assert!(!lazy.is_initialized());
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let first = lazy.get().await.unwrap();
    let second = lazy.get().await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert!(lazy.is_initialized());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_lazy_concurrent_get_builds_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let lazy = Arc::new(counting_cell(Arc::clone(&calls)));

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let lazy = Arc::clone(&lazy);
            tokio::spawn(async move { lazy.get().await.is_some() })
        })
        .collect();

    for task in tasks {
        assert!(task.await.unwrap());
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_lazy_caches_unconfigured() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let lazy = LazyPersistence::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        async { None }
    });

    assert!(lazy.get().await.is_none());
    assert!(lazy.get().await.is_none());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_lazy_ready_and_disabled() {
    let mut mock = MockPersistenceProvider::new();
    mock.expect_name().return_const("mock");
    let ready = LazyPersistence::ready(PersistenceService::new(Arc::new(mock)));
    assert!(ready.is_initialized());
    assert_eq!(ready.get().await.map(|s| s.provider_name()), Some("mock"));

    assert!(LazyPersistence::disabled().get().await.is_none());
}

// ============================================================================
// Factory
// ============================================================================

#[test]
fn test_provider_kind_parse() {
    assert_eq!("bigquery".parse::<ProviderKind>().unwrap(), ProviderKind::BigQuery);
    assert_eq!(" SQLite ".parse::<ProviderKind>().unwrap(), ProviderKind::Sqlite);
    assert!(matches!(
        "postgres".parse::<ProviderKind>(),
        Err(Error::Configuration(_))
    ));
}

#[tokio::test]
async fn test_factory_disabled_and_unknown() {
    let config = PersistenceConfig::default();
    assert!(PersistenceFactory::create_service(&config).await.is_none());

    let config = PersistenceConfig {
        provider: "postgres".to_string(),
        ..PersistenceConfig::default()
    };
    assert!(PersistenceFactory::create_service(&config).await.is_none());
}

#[tokio::test]
async fn test_factory_bigquery_requires_identifiers() {
    let mut config = PersistenceConfig {
        provider: "bigquery".to_string(),
        bigquery: BigQueryConfig {
            project_id: Some("proj".to_string()),
            dataset_id: Some("finops".to_string()),
            ..BigQueryConfig::default()
        },
        ..PersistenceConfig::default()
    };
    assert!(PersistenceFactory::create_service(&config).await.is_none());

    config.bigquery.table_id = Some("usage".to_string());
    let service = PersistenceFactory::create_service(&config).await.unwrap();
    assert_eq!(service.provider_name(), "bigquery");
}

#[tokio::test]
async fn test_factory_sqlite_from_path() {
    let dir = TempDir::new().unwrap();
    let config = PersistenceConfig {
        provider: "sqlite".to_string(),
        sqlite_path: Some(dir.path().join("usage.db")),
        ..PersistenceConfig::default()
    };

    let lazy = LazyPersistence::from_config(config);
    let service = lazy.get().await.unwrap();

    assert_eq!(service.provider_name(), "sqlite");
    let outcome = service.save_reports_batch(&reports(2)).await;
    assert_eq!(outcome, BatchOutcome::all_inserted(2));
}
