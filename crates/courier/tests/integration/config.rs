/*
 *  Copyright 2025-2026 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Configuration files through to node startup.

use serial_test::serial;
use std::io::Write;
use std::sync::Arc;

use courier::config::ConfigLoader;
use courier::remote::InMemoryJobStateStore;
use courier::transport::InMemoryLogClient;
use courier::{ConfigViolation, InMemoryOutboxStore, NodeBuilder, StartupError};

const NODE_CONFIG: &str = r#"
[dispatch]
channel_count = 3
global_timeout_ms = ${COURIER_TEST_TIMEOUT_MS:-2500}

[transport.log]
enabled = true
topic = "loan-events"

[partitioning]
in_process_enabled = true
manager_enabled = true
worker_enabled = true

[[jobs]]
job_name = "LOAN_CLOSE_OF_BUSINESS"
partition_size = 4
chunk_size = 2
thread_pool_core_size = 1
thread_pool_max_size = 2
thread_pool_queue_capacity = 10

[[jobs]]
job_name = "LOAN_ARREARS_AGEING"
partition_size = 5
chunk_size = 2
thread_pool_core_size = 1
thread_pool_max_size = 2
thread_pool_queue_capacity = 10
"#;

fn write_config(content: &str) -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("courier.toml");
    std::fs::File::create(&path)
        .unwrap()
        .write_all(content.as_bytes())
        .unwrap();
    (dir, path)
}

#[test]
#[serial]
fn test_node_starts_with_oversized_job_disabled() {
    std::env::remove_var("COURIER_TEST_TIMEOUT_MS");
    let (_dir, path) = write_config(NODE_CONFIG);
    let config = ConfigLoader::new().load_config(Some(path.as_path())).unwrap();
    assert_eq!(config.dispatch.global_timeout_ms, 2500);

    let node = NodeBuilder::new(config)
        .outbox_store(Arc::new(InMemoryOutboxStore::new()))
        .log_client(Arc::new(InMemoryLogClient::new(3)))
        .job_state_store(Arc::new(InMemoryJobStateStore::new()))
        .build()
        .unwrap();

    let catalog = node.catalog();
    assert!(catalog.is_enabled("LOAN_CLOSE_OF_BUSINESS"));
    assert!(!catalog.is_enabled("LOAN_ARREARS_AGEING"));
    let disabled: Vec<&str> = catalog.disabled_jobs().map(|(name, _)| name).collect();
    assert_eq!(disabled, vec!["LOAN_ARREARS_AGEING"]);

    assert_eq!(node.dispatcher().unwrap().channel_count(), 3);
    assert!(node.coordinator().is_some());
}

#[test]
#[serial]
fn test_environment_overrides_file_values() {
    std::env::set_var("COURIER_TEST_TIMEOUT_MS", "900");
    let (_dir, path) = write_config(NODE_CONFIG);
    let config = ConfigLoader::new().load_config(Some(path.as_path())).unwrap();
    std::env::remove_var("COURIER_TEST_TIMEOUT_MS");

    assert_eq!(config.dispatch.global_timeout_ms, 900);
    assert_eq!(config.transport.log.topic, "loan-events");
}

#[test]
fn test_both_transports_refuse_to_start() {
    let config = ConfigLoader::new()
        .parse(
            r#"
[transport.queue]
enabled = true

[transport.log]
enabled = true
"#,
        )
        .unwrap();

    let err = NodeBuilder::new(config)
        .outbox_store(Arc::new(InMemoryOutboxStore::new()))
        .build()
        .err()
        .unwrap();
    match err {
        StartupError::InvalidConfiguration { violations } => {
            assert_eq!(violations, vec![ConfigViolation::MultipleTransportsEnabled]);
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_in_process_delivery_needs_both_roles() {
    let config = ConfigLoader::new()
        .parse(
            r#"
[dispatch]
enabled = false

[partitioning]
in_process_enabled = true
worker_enabled = true
"#,
        )
        .unwrap();

    let err = NodeBuilder::new(config)
        .job_state_store(Arc::new(InMemoryJobStateStore::new()))
        .build()
        .err()
        .unwrap();
    assert!(matches!(
        err,
        StartupError::InvalidConfiguration { ref violations }
            if violations == &vec![ConfigViolation::InProcessRequiresManagerAndWorker]
    ));
}
