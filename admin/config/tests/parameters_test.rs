// Copyright (c) Venice Contributors
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use admin_config::Parameters;

#[test]
fn defaults_are_usable() {
    let parameters = Parameters::default();
    assert!(parameters.worker_pool_size >= 1);
    assert!(parameters.tail_batch_size >= 1);
    assert!(parameters.schedule_interval < parameters.checkpoint_interval);
    assert!(parameters.retry_backoff_base < parameters.retry_backoff_max);
}

#[test]
fn missing_fields_fall_back_to_defaults() {
    let parameters: Parameters = serde_json::from_str("{}").unwrap();
    assert_eq!(
        parameters.worker_pool_size,
        Parameters::default_worker_pool_size()
    );
    assert_eq!(
        parameters.checkpoint_interval,
        Parameters::default_checkpoint_interval()
    );
}

#[test]
fn explicit_fields_override_defaults() {
    let parameters: Parameters = serde_json::from_str(
        r#"{"worker_pool_size": 2, "retry_backoff_base": {"secs": 1, "nanos": 0}}"#,
    )
    .unwrap();
    assert_eq!(parameters.worker_pool_size, 2);
    assert_eq!(parameters.retry_backoff_base, Duration::from_secs(1));
    assert_eq!(
        parameters.tail_batch_size,
        Parameters::default_tail_batch_size()
    );
}
