//! 服务生命周期集成测试

mod common;

use common::{eventually, write_config, RecordingLogger};
use service_bootstrap::config::ConfigStore;
use service_bootstrap::core::{ServiceDescriptor, ServiceRunner, ServiceState};
use service_bootstrap::error::{PidError, ServiceError};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

#[tokio::test]
async fn test_start_reads_config_and_stop_runs_on_explicit_stop() {
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(ConfigStore::new());
    store
        .init(write_config(&temp_dir, r#"{"config_string": "testvalue"}"#))
        .unwrap();

    let started = Arc::new(AtomicBool::new(false));
    let stopped = Arc::new(AtomicBool::new(false));
    let descriptor = {
        let store = Arc::clone(&store);
        let started = Arc::clone(&started);
        let stopped = Arc::clone(&stopped);
        ServiceDescriptor::new()
            .on_start(move || {
                assert_eq!(store.string("config_string", ""), "testvalue");
                started.store(true, Ordering::SeqCst);
            })
            .on_stop(move || stopped.store(true, Ordering::SeqCst))
    };

    let mut runner = ServiceRunner::new(descriptor).with_pid_file(temp_dir.path().join("svc.pid"));
    runner.run(false).await.unwrap();

    assert!(started.load(Ordering::SeqCst));
    assert!(!stopped.load(Ordering::SeqCst));
    assert_eq!(runner.state(), ServiceState::Running);

    runner.stop().unwrap();
    assert!(stopped.load(Ordering::SeqCst));
    assert_eq!(runner.state(), ServiceState::Stopped);
}

#[tokio::test]
async fn test_panicking_start_is_logged_and_stop_still_runs() {
    let temp_dir = TempDir::new().unwrap();
    let logger = Arc::new(RecordingLogger::default());
    let stopped = Arc::new(AtomicBool::new(false));
    let stopped_flag = Arc::clone(&stopped);

    let mut runner = ServiceRunner::new(
        ServiceDescriptor::new()
            .on_start(|| panic!("数据库连接失败"))
            .on_stop(move || stopped_flag.store(true, Ordering::SeqCst))
            .logger(Arc::clone(&logger) as Arc<dyn service_bootstrap::ServiceLogger>),
    )
    .with_pid_file(temp_dir.path().join("svc.pid"));
    let handle = runner.shutdown_handle();

    let watcher = async {
        let logged = eventually(Duration::from_secs(5), || {
            !logger.critical_entries().is_empty()
        })
        .await;
        assert_eq!(handle.state(), ServiceState::Waiting);
        handle.shutdown();
        logged
    };

    let (result, logged) = tokio::time::timeout(
        Duration::from_secs(10),
        async { tokio::join!(runner.run(true), watcher) },
    )
    .await
    .expect("等待超时");

    result.unwrap();
    assert!(logged);
    assert!(stopped.load(Ordering::SeqCst));
    assert_eq!(runner.state(), ServiceState::Stopped);

    let critical = logger.critical_entries();
    assert_eq!(critical.len(), 1);
    assert!(critical[0].contains("数据库连接失败"));
    assert!(logger.info_entries().iter().any(|m| m == "Bye-Bye"));
}

#[tokio::test]
async fn test_start_runs_concurrently_with_wait() {
    let temp_dir = TempDir::new().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_in_start = Arc::clone(&calls);

    let mut runner = ServiceRunner::new(ServiceDescriptor::new().on_start(move || {
        // 长时间运行的启动回调不会阻塞等待阶段
        std::thread::sleep(Duration::from_millis(50));
        calls_in_start.fetch_add(1, Ordering::SeqCst);
    }))
    .with_pid_file(temp_dir.path().join("svc.pid"));
    let handle = runner.shutdown_handle();

    let watcher = async {
        assert!(eventually(Duration::from_secs(5), || handle.state() == ServiceState::Waiting).await);
        assert!(eventually(Duration::from_secs(5), || calls.load(Ordering::SeqCst) == 1).await);
        handle.shutdown();
    };

    let (result, ()) = tokio::join!(runner.run(true), watcher);
    result.unwrap();
    assert_eq!(runner.state(), ServiceState::Stopped);
}

#[tokio::test]
async fn test_missing_start_is_rejected_before_side_effects() {
    let temp_dir = TempDir::new().unwrap();
    let pid_path = temp_dir.path().join("svc.pid");
    let mut runner = ServiceRunner::new(ServiceDescriptor::new().on_stop(|| {}))
        .with_pid_file(&pid_path);

    let err = runner.run(true).await.unwrap_err();
    assert!(matches!(err, ServiceError::MissingStart));
    assert!(!pid_path.exists());
}

#[tokio::test]
async fn test_second_instance_never_starts() {
    let temp_dir = TempDir::new().unwrap();
    let pid_path = temp_dir.path().join("svc.pid");

    let mut first = ServiceRunner::new(ServiceDescriptor::new().on_start(|| {}))
        .with_pid_file(&pid_path);
    first.run(false).await.unwrap();

    let second_started = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&second_started);
    let mut second = ServiceRunner::new(
        ServiceDescriptor::new().on_start(move || flag.store(true, Ordering::SeqCst)),
    )
    .with_pid_file(&pid_path);

    let err = second.run(false).await.unwrap_err();
    assert!(matches!(err, ServiceError::Pid(PidError::LockHeld { .. })));
    assert!(!second_started.load(Ordering::SeqCst));

    // 第一个实例释放后可以重新获取
    first.stop().unwrap();
    drop(first);
    let mut third = ServiceRunner::new(ServiceDescriptor::new().on_start(|| {}))
        .with_pid_file(&pid_path);
    third.run(false).await.unwrap();
}

#[tokio::test]
async fn test_double_start_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let mut runner = ServiceRunner::new(ServiceDescriptor::new().on_start(|| {}))
        .with_pid_file(temp_dir.path().join("svc.pid"));

    runner.run(false).await.unwrap();
    assert!(matches!(
        runner.run(true).await.unwrap_err(),
        ServiceError::AlreadyStarted { .. }
    ));
}
