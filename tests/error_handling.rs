use std::error::Error;
use xops::bench::{Iterations, Kernel, ParallelEngine, WorkerDispatch};
use xops::config::HarnessConfig;
use xops::error;
use xops::XopsError;

#[test]
fn test_user_friendly_messages() {
    let msg = error::user_friendly_message(&XopsError::OutOfRange("17000000".into()));
    assert!(msg.contains("16 million"));

    let msg = error::user_friendly_message(&XopsError::TimerError("no runtime".into()));
    assert!(msg.contains("sampling timer"));

    let msg = error::user_friendly_message(&XopsError::InvalidConfiguration("zero threads".into()));
    assert!(msg.contains("zero threads"));
}

#[test]
fn test_invalidates_run() {
    assert!(error::invalidates_run(&XopsError::WorkerError("panic".into())));
    assert!(error::invalidates_run(&XopsError::OutOfRange("n".into())));
    assert!(!error::invalidates_run(&XopsError::PersistenceError("disk full".into())));
}

#[test]
fn test_error_conversions() {
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
    let err: XopsError = io.into();
    assert!(matches!(err, XopsError::IoError(_)));
    assert!(err.source().is_some());

    let json = serde_json::from_str::<u32>("nope").unwrap_err();
    assert!(matches!(XopsError::from(json), XopsError::PersistenceError(_)));

    let toml = toml::from_str::<HarnessConfig>("repeats = [").unwrap_err();
    let err = XopsError::from(toml);
    assert!(matches!(err, XopsError::ConfigError(_)));
    assert!(err.to_string().starts_with("Configuration error"));
}

#[test]
fn test_parallel_errors_leave_engine_usable() {
    let mut engine = ParallelEngine::new();
    assert!(matches!(
        engine.run_parallel(Kernel::Int32, Iterations::Fixed(10), 0, WorkerDispatch::DedicatedThreads),
        Err(XopsError::InvalidConfiguration(_))
    ));
    assert!(matches!(
        engine.run_parallel(Kernel::Flt32, Iterations::Fixed(20_000_000), 2, WorkerDispatch::DedicatedThreads),
        Err(XopsError::OutOfRange(_))
    ));
    // No runtime entered
    assert!(matches!(
        engine.run_parallel(Kernel::Int32, Iterations::Fixed(10), 2, WorkerDispatch::BlockingPool),
        Err(XopsError::WorkerError(_))
    ));

    assert!(engine
        .run_parallel(Kernel::Int32, Iterations::Fixed(10_000), 2, WorkerDispatch::DedicatedThreads)
        .is_ok());
}

#[test]
fn test_open_ended_run_rejects_second_start() {
    let mut engine = ParallelEngine::with_micro_block_size(10_000).unwrap();
    engine
        .run_parallel(Kernel::Int64, Iterations::OpenEnded, 2, WorkerDispatch::DedicatedThreads)
        .unwrap();
    assert!(matches!(
        engine.run_parallel(Kernel::Int64, Iterations::Fixed(10), 2, WorkerDispatch::DedicatedThreads),
        Err(XopsError::InvalidConfiguration(_))
    ));
    engine.stop().unwrap();
}
