//! Integration tests for the statcache CLI
//!
//! These tests require a running S3-compatible server. Credentials come
//! from the usual AWS environment variables.
//!
//! Run with:
//! ```bash
//! docker run -d --name minio -p 9000:9000 \
//!     -e MINIO_ROOT_USER=accesskey -e MINIO_ROOT_PASSWORD=secretkey \
//!     minio/minio server /data
//!
//! export AWS_ACCESS_KEY_ID=accesskey AWS_SECRET_ACCESS_KEY=secretkey AWS_REGION=us-east-1
//! export TEST_S3_ENDPOINT=http://localhost:9000
//! cargo test --features integration
//! ```

#![cfg(feature = "integration")]

use std::path::Path;
use std::process::{Command, Output};

use sc_core::config::StoreConfig;
use sc_s3::S3Client;
use tempfile::TempDir;

const INITIAL_PREFIX: &str = "network/wifi/ncsdata";

/// Objects seeded into every test bucket
const KEYS: &[&str] = &[
    "network/wifi/ncsdata/dar5/ApDetails/2021/02/28/1614470400000_ApDetails.csv",
    "network/wifi/ncsdata/dar5/ApDetails/2021/03/01/1614556800000_ApDetailsv2.csv",
    "network/wifi/ncsdata/dar5/ApDetails/2021/03/15/1615766400000_ApDetailsv2.csv",
    "network/wifi/ncsdata/dar5/ApDetails/2021/03/15/notes.txt",
    "network/wifi/ncsdata/dar5/ApDetails/2021/03/31/1617148800000_ApDetailsv2.csv",
    "network/wifi/ncsdata/dar5/ApDetails/2021/04/01/1617235200000_ApDetailsv2.csv",
];

struct TestEnv {
    _dir: TempDir,
    config_dir: std::path::PathBuf,
    cache_dir: std::path::PathBuf,
    bucket: String,
}

impl TestEnv {
    fn run(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_statcache"))
            .args(args)
            .env("STATCACHE_CONFIG_DIR", &self.config_dir)
            .env("STATCACHE_CACHE_DIR", &self.cache_dir)
            .output()
            .expect("Failed to execute statcache")
    }

    fn run_json(&self, args: &[&str]) -> serde_json::Value {
        let mut args = args.to_vec();
        args.push("--json");
        let output = self.run(&args);
        assert!(
            output.status.success(),
            "statcache {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        serde_json::from_slice(&output.stdout).expect("valid JSON output")
    }
}

fn store_config() -> Option<StoreConfig> {
    let endpoint = std::env::var("TEST_S3_ENDPOINT").ok()?;
    Some(StoreConfig {
        endpoint: Some(endpoint),
        region: Some(std::env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".into())),
        force_path_style: true,
        ..Default::default()
    })
}

/// Generate unique suffix for test resources
fn unique_suffix() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let duration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    format!("{:x}", duration.as_nanos() % 0xFFFF_FFFF)
}

async fn setup(name: &str) -> Option<TestEnv> {
    let store = store_config()?;
    let client = S3Client::new(&store).await.ok()?;
    let bucket = format!("statcache-{name}-{}", unique_suffix());

    client.inner().create_bucket().bucket(&bucket).send().await.ok()?;
    for key in KEYS {
        client
            .inner()
            .put_object()
            .bucket(&bucket)
            .key(*key)
            .body(key.as_bytes().to_vec().into())
            .send()
            .await
            .ok()?;
    }

    let dir = tempfile::tempdir().ok()?;
    let config_dir = dir.path().join("config");
    let cache_dir = dir.path().join("cache");
    std::fs::create_dir_all(&config_dir).ok()?;
    write_config(&config_dir, &store, &bucket);

    Some(TestEnv {
        _dir: dir,
        config_dir,
        cache_dir,
        bucket,
    })
}

fn write_config(dir: &Path, store: &StoreConfig, bucket: &str) {
    let content = format!(
        r#"
schema_version = 1

[store]
bucket = "{bucket}"
initial_prefix = "{INITIAL_PREFIX}"
endpoint = "{}"
region = "{}"
force_path_style = true
"#,
        store.endpoint.as_deref().unwrap_or_default(),
        store.region.as_deref().unwrap_or_default(),
    );
    std::fs::write(dir.join("config.toml"), content).unwrap();
}

#[tokio::test]
async fn test_ls_selects_inclusive_date_range() {
    let Some(env) = setup("ls").await else {
        eprintln!("Skipping: TEST_S3_ENDPOINT not set or server unavailable");
        return;
    };

    let output = env.run_json(&[
        "ls",
        "dar5/ApDetails",
        "--from",
        "2021/03/01",
        "--to",
        "2021/03/31",
        "--table",
        "ApDetails",
    ]);
    let keys: Vec<&str> = output["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["key"].as_str().unwrap())
        .collect();
    assert_eq!(keys, vec![KEYS[1], KEYS[2], KEYS[4]]);
    assert_eq!(output["summary"]["total_objects"], 3);
}

#[tokio::test]
async fn test_ls_inverted_range_is_empty() {
    let Some(env) = setup("empty").await else {
        eprintln!("Skipping: TEST_S3_ENDPOINT not set or server unavailable");
        return;
    };

    let output = env.run_json(&["ls", "dar5/ApDetails", "--from", "2021/04", "--to", "2021/03"]);
    assert_eq!(output["items"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_cat_goes_through_cache() {
    let Some(env) = setup("cat").await else {
        eprintln!("Skipping: TEST_S3_ENDPOINT not set or server unavailable");
        return;
    };
    let path = format!("{}/{}", env.bucket, KEYS[2]);

    let first = env.run(&["cat", &path]);
    assert!(first.status.success());
    assert_eq!(first.stdout, KEYS[2].as_bytes());

    let second = env.run(&["cat", &path]);
    assert_eq!(second.stdout, first.stdout);

    let entries = env.run_json(&["cache", "list"]);
    let entries = entries.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["key"], KEYS[2]);
}

#[tokio::test]
async fn test_cat_missing_object_exit_code() {
    let Some(env) = setup("missing").await else {
        eprintln!("Skipping: TEST_S3_ENDPOINT not set or server unavailable");
        return;
    };

    let output = env.run(&["cat", &format!("{}/no/such/1_Key.csv", env.bucket)]);
    assert_eq!(output.status.code(), Some(5));
}

#[tokio::test]
async fn test_fetch_then_expire() {
    let Some(env) = setup("fetch").await else {
        eprintln!("Skipping: TEST_S3_ENDPOINT not set or server unavailable");
        return;
    };

    let summary = env.run_json(&["fetch", "dar5/ApDetails", "--from", "2021/03/15", "--to", "2021/03/15"]);
    // notes.txt is selected but doesn't follow the key convention
    assert_eq!(summary["fetched"], 1);
    assert_eq!(summary["skipped"], 1);
    assert_eq!(summary["from_remote"], 1);

    let again = env.run_json(&["fetch", "dar5/ApDetails", "--from", "2021/03/15", "--to", "2021/03/15"]);
    assert_eq!(again["from_cache"], 1);

    let report = env.run_json(&["cache", "expire", "--max-mb", "0"]);
    assert_eq!(report["removed"], 1);
    assert_eq!(report["remaining"], 0);
}
