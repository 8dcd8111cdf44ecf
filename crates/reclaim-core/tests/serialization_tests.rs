//! Serialization tests for reclaim-core types.

use chrono::Utc;
use reclaim_core::events::*;
use reclaim_core::ids::*;
use reclaim_core::job::*;

#[test]
fn test_job_roundtrip() {
    let job = Job::new("/tmp/archive.7z", AttackConfig::default(), 7).expect("valid job");

    let json = serde_json::to_string(&job).expect("serialize");
    let parsed: Job = serde_json::from_str(&json).expect("deserialize");

    assert_eq!(job.id, parsed.id);
    assert_eq!(job.target, parsed.target);
    assert_eq!(job.priority, parsed.priority);
    assert_eq!(job.config, parsed.config);
}

#[test]
fn test_job_status_serialization() {
    assert_eq!(
        serde_json::to_string(&JobStatus::Queued).unwrap(),
        "\"queued\""
    );
    assert_eq!(
        serde_json::to_string(&JobStatus::Processing).unwrap(),
        "\"processing\""
    );
    assert_eq!(
        serde_json::to_string(&JobStatus::Completed).unwrap(),
        "\"completed\""
    );
    assert_eq!(
        serde_json::to_string(&JobStatus::Failed).unwrap(),
        "\"failed\""
    );
}

#[test]
fn test_char_class_serialization() {
    assert_eq!(
        serde_json::to_string(&CharClass::Lowercase).unwrap(),
        "\"lowercase\""
    );
    let parsed: Vec<CharClass> = serde_json::from_str(r#"["numbers","special"]"#).unwrap();
    assert_eq!(parsed, vec![CharClass::Numbers, CharClass::Special]);
}

#[test]
fn test_scheduler_event_tagging() {
    let event = SchedulerEvent::JobRetry {
        job_id: JobId::new(),
        retry_count: 2,
        error: "Worker stopped before completion".to_string(),
    };

    let value = serde_json::to_value(&event).expect("serialize");
    assert_eq!(value["type"], "job_retry");
    assert_eq!(event.name(), "job-retry");

    let parsed: SchedulerEvent = serde_json::from_value(value).expect("deserialize");
    match parsed {
        SchedulerEvent::JobRetry { retry_count, .. } => assert_eq!(retry_count, 2),
        other => panic!("Wrong event type: {}", other.name()),
    }
}

#[test]
fn test_completed_event_carries_stats() {
    let stats = BatchStats {
        total_jobs: 3,
        processed: 3,
        succeeded: 2,
        failed: 1,
        total_units_tested: 4200,
        total_secrets_found: 2,
        started_at: Some(Utc::now()),
        ended_at: Some(Utc::now()),
    };
    let event = SchedulerEvent::Completed {
        stats: stats.clone(),
    };

    let json = serde_json::to_string(&event).expect("serialize");
    let parsed: SchedulerEvent = serde_json::from_str(&json).expect("deserialize");

    match parsed {
        SchedulerEvent::Completed { stats: parsed } => assert_eq!(parsed, stats),
        other => panic!("Wrong event type: {}", other.name()),
    }
}

#[test]
fn test_cache_event_names() {
    let eviction = CacheEvent::CacheEviction {
        key: "abc".to_string(),
        reason: EvictionReason::Lru,
    };
    assert_eq!(eviction.name(), "cache-eviction");

    let value = serde_json::to_value(&eviction).unwrap();
    assert_eq!(value["reason"], "lru");
    assert_eq!(CacheEvent::Cleanup { expired_entries: 1, expired_patterns: 0 }.name(), "cleanup");
}
