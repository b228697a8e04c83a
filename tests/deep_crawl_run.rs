//! Run-level tests for the deep crawler: hard timeout containment,
//! crawl-state recording, and checkpoint durability.

use lead_sleuth_core::{Config, CrawlStateStore, DeepCrawler, VerticalConfig};

use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;

/// A TCP listener that accepts connections and then never answers:
/// the classic hung web server.
async fn start_black_hole() -> (String, tokio::task::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                // Read and discard forever, never respond.
                let mut buf = [0u8; 1024];
                while let Ok(n) = socket.read(&mut buf).await {
                    if n == 0 {
                        break;
                    }
                }
            });
        }
    });
    (format!("http://{}", addr), handle)
}

fn test_config(dir: &std::path::Path) -> Config {
    Config {
        output_dir: dir.to_string_lossy().into_owned(),
        crawl_state_path: dir.join("crawl_state.json").to_string_lossy().into_owned(),
        domain_hard_timeout: Duration::from_secs(1),
        batch_timeout_per_domain: Duration::from_secs(5),
        request_timeout: Duration::from_secs(10),
        webdriver_url: None,
        ..Config::default()
    }
}

#[tokio::test]
async fn hung_domain_is_skipped_with_timeout_status_and_no_contacts() {
    let dir = tempdir().unwrap();
    let (url, server) = start_black_hole().await;

    let targets_path = dir.path().join("targets.txt");
    std::fs::write(&targets_path, format!("{}\n", url)).unwrap();

    let config = Arc::new(test_config(dir.path()));
    let state = Arc::new(
        CrawlStateStore::load(&config.crawl_state_path, config.stale_days).unwrap(),
    );
    let crawler =
        DeepCrawler::new(Arc::clone(&config), &VerticalConfig::default(), Arc::clone(&state), false)
            .unwrap();

    let outcome = crawler.run(targets_path.to_str().unwrap()).await.unwrap();
    server.abort();

    // The hard budget fired: the domain shows up as skipped (timeout)
    // in the run summary and contributed zero contacts.
    assert_eq!(outcome.summary.domains_skipped_timeout, 1);
    assert_eq!(outcome.summary.domains_crawled, 0);
    assert!(outcome.leads.is_empty());

    // The crawl state records the skip, so the domain is retried on the
    // next freshness-eligible run.
    let reloaded = CrawlStateStore::load(&config.crawl_state_path, config.stale_days).unwrap();
    assert!(reloaded.is_stale(&url));
}

#[tokio::test]
async fn unreachable_domain_fails_without_aborting_the_batch() {
    let dir = tempdir().unwrap();

    // Nothing listens on this port; connections are refused instantly.
    let dead_url = {
        let probe = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = probe.local_addr().unwrap();
        drop(probe);
        format!("http://{}", addr)
    };
    let (hung_url, server) = start_black_hole().await;

    let targets_path = dir.path().join("targets.txt");
    std::fs::write(&targets_path, format!("{}\n{}\n", dead_url, hung_url)).unwrap();

    let config = Arc::new(test_config(dir.path()));
    let state = Arc::new(
        CrawlStateStore::load(&config.crawl_state_path, config.stale_days).unwrap(),
    );
    let crawler =
        DeepCrawler::new(Arc::clone(&config), &VerticalConfig::default(), Arc::clone(&state), false)
            .unwrap();

    let outcome = crawler.run(targets_path.to_str().unwrap()).await.unwrap();
    server.abort();

    // One domain hung (timeout), one refused (crawled with zero pages):
    // neither killed the batch and both are accounted for.
    assert_eq!(outcome.summary.domains_skipped_timeout, 1);
    assert_eq!(
        outcome.summary.domains_crawled + outcome.summary.domains_failed,
        1
    );
    assert!(outcome.leads.is_empty());
}

#[tokio::test]
async fn checkpoint_written_after_each_batch_survives_reload() {
    let dir = tempdir().unwrap();
    let (url, server) = start_black_hole().await;

    let targets_path = dir.path().join("targets.txt");
    std::fs::write(&targets_path, format!("{}\n", url)).unwrap();

    let config = Arc::new(test_config(dir.path()));
    let state = Arc::new(
        CrawlStateStore::load(&config.crawl_state_path, config.stale_days).unwrap(),
    );
    let crawler =
        DeepCrawler::new(Arc::clone(&config), &VerticalConfig::default(), Arc::clone(&state), false)
            .unwrap();
    crawler.run(targets_path.to_str().unwrap()).await.unwrap();
    server.abort();

    // Even an empty run leaves a checkpoint file behind (zero leads),
    // so crash recovery has a consistent file to read.
    let checkpoint = dir.path().join("crawl_checkpoint.csv");
    assert!(checkpoint.exists());
    let recovered =
        lead_sleuth_core::crawler::checkpoint::load_checkpoint(&checkpoint).unwrap();
    assert!(recovered.is_empty());
}
