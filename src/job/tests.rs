use super::*;
use tokio::sync::mpsc;
use tokio::time::Duration;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_job_completion_is_matched() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut runner = AsyncJobRunner::new();
    let handle = tokio::runtime::Handle::current();
    let id = runner.start(&handle, "test", |_env| 42, move |id, result| {
        let _ = tx.send((id, result));
    });
    assert!(runner.is_busy());
    let (done_id, result) = rx.recv().await.unwrap();
    assert_eq!(result, Some(42));
    assert!(runner.finish(done_id));
    assert_eq!(done_id, id);
    assert!(!runner.is_busy());
    assert!(!runner.finish(done_id));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancelled_job_sees_token_and_is_ignored() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut runner = AsyncJobRunner::new();
    let handle = tokio::runtime::Handle::current();
    let id = runner.start(
        &handle,
        "slow",
        |env| {
            for _ in 0..500 {
                if env.is_cancelled() {
                    return true;
                }
                env.sleep(Duration::from_millis(10));
            }
            false
        },
        move |id, result| {
            let _ = tx.send((id, result));
        },
    );
    runner.cancel();
    assert!(!runner.is_busy());
    let (done_id, saw_cancel) = rx.recv().await.unwrap();
    assert_eq!(done_id, id);
    assert_eq!(saw_cancel, Some(true));
    assert!(!runner.finish(done_id));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_restart_supersedes_and_panics_are_reported() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut runner = AsyncJobRunner::new();
    let handle = tokio::runtime::Handle::current();
    let tx2 = tx.clone();
    let first = runner.start(&handle, "first", |env| env.is_cancelled(), move |id, r| {
        let _ = tx.send((id, r));
    });
    let second = runner.start(&handle, "second", |_env| -> bool { panic!("boom") }, move |id, r| {
        let _ = tx2.send((id, r));
    });
    assert_ne!(first, second);
    let mut results = vec![rx.recv().await.unwrap(), rx.recv().await.unwrap()];
    results.sort_by_key(|(id, _)| *id);
    assert!(!runner.finish(first));
    assert_eq!(results[1], (second, None));
    assert!(runner.finish(second));
}

#[test]
fn test_null_environment() {
    let env = NullOperationEnvironment;
    assert!(!env.is_cancelled());
    env.sleep(Duration::from_millis(1));
    env.set_text("nothing");
}
