use multitask_core::{
    of, run_single_thread, ErrorCategory, OptionTraversal, Pipeline, PipelineError, Result,
    StageKind, StagePath, VecTraversal,
};
use multitask_distributed::{
    run_distributed, CancelFlag, CancellationPolicy, DistributedConfig, DistributedExecutor,
    FailureKind, Reply, ReplyPort, Role, WorkerBody, WorkerMessage, WorkerSpawner, WorkerStart,
};
use serde_json::json;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

fn transform_only() -> Pipeline<String> {
    of(1i64).map(|n| n + 2).map(|n| n.to_string())
}

fn greeting() -> Pipeline<String> {
    let functions = of("hello".to_string()).map(|prefix| move |n: i64| format!("{}: {}", prefix, n));
    of(1i64).map(|n| n + 1).ap(functions)
}

fn increments() -> Pipeline<Vec<i64>> {
    of(vec![1i64, 2, 3])
        .map_each(VecTraversal, |n: i64| n + 1)
        .par_map(VecTraversal, |n: i64| n + 1)
        .map_each(VecTraversal, |n: i64| n + 1)
}

fn hundred_zeros() -> Pipeline<Vec<i64>> {
    of(vec![0i64; 100])
        .map_each(VecTraversal, |n: i64| n + 1)
        .par_map(VecTraversal, |n: i64| n + 1)
        .map_each(VecTraversal, |n: i64| n + 1)
}

fn thread_ids() -> Pipeline<Vec<String>> {
    of(vec![0u8; 10]).par_map(VecTraversal, |_: u8| format!("{:?}", thread::current().id()))
}

fn thread_names() -> Pipeline<Vec<String>> {
    of(vec![0u8; 4]).par_map(VecTraversal, |_: u8| {
        thread::current().name().unwrap_or("unnamed").to_string()
    })
}

fn sleepers() -> Pipeline<Vec<u64>> {
    of(vec![300u64; 10]).par_map(VecTraversal, |ms: u64| {
        thread::sleep(Duration::from_millis(ms));
        ms
    })
}

fn par_map_inside_apply() -> Pipeline<String> {
    let functions = of(vec![1i64, 2, 3])
        .par_map(VecTraversal, |n: i64| n + 1)
        .map(|v: Vec<i64>| {
            let total: i64 = v.iter().sum();
            move |n: i64| format!("hello: {}", total * n)
        });
    of(1i64).ap(functions)
}

fn failing_element() -> Pipeline<Vec<i64>> {
    of(vec![1i64, 2, 3, 4]).try_par_map(VecTraversal, |n: i64| {
        if n == 3 {
            Err(format!("element {} failed", n))
        } else {
            Ok(n)
        }
    })
}

fn panicking_element() -> Pipeline<Vec<i64>> {
    of(vec![1i64, 2, 3]).par_map(VecTraversal, |n: i64| {
        if n == 2 {
            panic!("element {} exploded", n);
        }
        n
    })
}

fn empty_container() -> Pipeline<Vec<i64>> {
    of(Vec::<i64>::new()).par_map(VecTraversal, |n: i64| n + 1)
}

fn optional_element() -> Pipeline<Option<String>> {
    of(Some(41i64)).par_map(OptionTraversal, |n: i64| (n + 1).to_string())
}

const NESTING: usize = 20_000;

fn deeply_nested_fan_out() -> Pipeline<i64> {
    let innermost = of(vec![1i64, 2, 3])
        .par_map(VecTraversal, |n: i64| n * 10)
        .map(|v: Vec<i64>| {
            let total: i64 = v.iter().sum();
            move |n: i64| n + total
        });
    (1..NESTING).fold(of(0i64).ap(innermost), |inner, _| {
        of(0i64).ap(inner.map(|child: i64| move |n: i64| n + child))
    })
}

static CANCELLED_RUNS: AtomicUsize = AtomicUsize::new(0);

fn first_element_fails() -> Pipeline<Vec<u32>> {
    of((0..10u32).collect::<Vec<_>>()).try_par_map(VecTraversal, |n: u32| {
        CANCELLED_RUNS.fetch_add(1, Ordering::SeqCst);
        if n == 0 {
            Err("first element failed".to_string())
        } else {
            Ok(n)
        }
    })
}

static SIBLING_RUNS: AtomicUsize = AtomicUsize::new(0);

fn first_fails_siblings_slow() -> Pipeline<Vec<u32>> {
    of((0..10u32).collect::<Vec<_>>()).try_par_map(VecTraversal, |n: u32| {
        if n == 0 {
            SIBLING_RUNS.fetch_add(1, Ordering::SeqCst);
            return Err("first element failed".to_string());
        }
        thread::sleep(Duration::from_millis(50));
        SIBLING_RUNS.fetch_add(1, Ordering::SeqCst);
        Ok(n)
    })
}

async fn coordinate<T: 'static>(entry: fn() -> Pipeline<T>) -> Result<T> {
    let result = run_distributed(entry, Role::Coordinator).await?;
    Ok(result.expect("coordinator always yields a result"))
}

/// Worker start-up for `path`, plus the coordinator's end of the reply port
fn worker_start(path: Vec<usize>, value: serde_json::Value) -> (WorkerStart, tokio::sync::oneshot::Receiver<String>) {
    let (reply, receiver) = ReplyPort::channel();
    let start = WorkerStart {
        name: "multitask-worker-0".to_string(),
        payload: WorkerMessage::new(StagePath::new(path), value).encode().unwrap(),
        reply,
        cancel: CancelFlag::default(),
    };
    (start, receiver)
}

/// Runs worker bodies one after another on a single background thread
struct SerialSpawner {
    queue: Mutex<mpsc::Sender<WorkerBody>>,
}

impl SerialSpawner {
    fn new() -> Self {
        let (tx, rx) = mpsc::channel::<WorkerBody>();
        thread::spawn(move || {
            for body in rx {
                body();
            }
        });
        Self {
            queue: Mutex::new(tx),
        }
    }
}

impl WorkerSpawner for SerialSpawner {
    fn spawn(&self, name: &str, body: WorkerBody) -> Result<()> {
        self.queue
            .lock()
            .unwrap()
            .send(body)
            .map_err(|e| PipelineError::WorkerSpawn(format!("{}: {}", name, e)))
    }
}

struct RefusingSpawner;

impl WorkerSpawner for RefusingSpawner {
    fn spawn(&self, name: &str, _body: WorkerBody) -> Result<()> {
        Err(PipelineError::WorkerSpawn(format!("{}: no capacity", name)))
    }
}

#[tokio::test]
async fn test_transform_only_pipeline() {
    assert_eq!(coordinate(transform_only).await.unwrap(), "3");
}

#[tokio::test]
async fn test_apply_pipeline() {
    assert_eq!(coordinate(greeting).await.unwrap(), "hello: 2");
}

#[tokio::test]
async fn test_parallel_map_preserves_shape_and_order() {
    assert_eq!(coordinate(increments).await.unwrap(), vec![4, 5, 6]);
}

#[tokio::test]
async fn test_large_fan_out() {
    assert_eq!(coordinate(hundred_zeros).await.unwrap(), vec![3; 100]);
}

#[tokio::test]
async fn test_each_element_runs_on_its_own_thread() {
    let ids = coordinate(thread_ids).await.unwrap();
    let distinct: HashSet<&String> = ids.iter().collect();
    let coordinator_thread = format!("{:?}", thread::current().id());

    assert_eq!(ids.len(), 10);
    assert_eq!(distinct.len(), 10);
    assert!(!distinct.contains(&coordinator_thread));
}

#[tokio::test]
async fn test_blocking_elements_overlap() {
    let started = Instant::now();
    let output = coordinate(sleepers).await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(output, vec![300; 10]);
    assert!(elapsed < Duration::from_millis(2_000), "took {:?}", elapsed);
}

#[tokio::test]
async fn test_worker_threads_use_configured_prefix() {
    let names = DistributedExecutor::new(thread_names)
        .with_config(DistributedConfig::new().with_worker_name_prefix("calc"))
        .run(Role::Coordinator)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(names, vec!["calc-0", "calc-1", "calc-2", "calc-3"]);
}

#[tokio::test]
async fn test_parallel_map_inside_apply() {
    assert_eq!(coordinate(par_map_inside_apply).await.unwrap(), "hello: 9");
}

#[tokio::test]
async fn test_worker_resolves_two_hop_path() {
    let (start, receiver) = worker_start(vec![0, 0], json!(2));
    let outcome = run_distributed(par_map_inside_apply, Role::Worker(start)).await.unwrap();
    assert!(outcome.is_none());

    let reply = Reply::decode(&receiver.await.unwrap()).unwrap();
    assert_eq!(reply.into_result().unwrap(), json!(3));
}

#[tokio::test]
async fn test_workers_resolve_deeply_nested_stage() {
    assert_eq!(coordinate(deeply_nested_fan_out).await.unwrap(), 60);
}

#[tokio::test]
async fn test_engines_agree() {
    for entry in [transform_only as fn() -> Pipeline<String>, greeting, par_map_inside_apply] {
        let single = run_single_thread(entry()).await.unwrap();
        let distributed = coordinate(entry).await.unwrap();
        assert_eq!(single, distributed);
    }
}

#[tokio::test]
async fn test_same_entry_point_gives_same_result() {
    let first = coordinate(increments).await.unwrap();
    let second = coordinate(increments).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_empty_container_starts_no_workers() {
    let output = DistributedExecutor::new(empty_container)
        .with_spawner(Arc::new(RefusingSpawner))
        .run(Role::Coordinator)
        .await
        .unwrap();
    assert_eq!(output, Some(Vec::new()));
}

#[tokio::test]
async fn test_option_capability() {
    assert_eq!(coordinate(optional_element).await.unwrap(), Some("42".to_string()));
}

#[tokio::test]
async fn test_one_failing_element_fails_the_run() {
    let err = coordinate(failing_element).await.unwrap_err();

    assert_eq!(err.category(), ErrorCategory::Stage);
    match &err {
        PipelineError::Stage { kind, index, .. } => {
            assert_eq!(*kind, StageKind::ParallelMap);
            assert_eq!(*index, 0);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(matches!(err.root_cause(), PipelineError::Raised(m) if m == "element 3 failed"));
}

#[tokio::test]
async fn test_panicking_worker_is_reported_as_exited() {
    let err = coordinate(panicking_element).await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Transport);
    assert!(matches!(&err, PipelineError::WorkerExited(m) if m.contains("multitask-worker-1")));
}

#[tokio::test]
async fn test_spawn_failure_is_a_transport_error() {
    let err = DistributedExecutor::new(increments)
        .with_spawner(Arc::new(RefusingSpawner))
        .run(Role::Coordinator)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::WorkerSpawn(_)));
    assert_eq!(err.category(), ErrorCategory::Transport);
}

#[tokio::test]
async fn test_invalid_config_fails_before_any_worker_starts() {
    let err = DistributedExecutor::new(increments)
        .with_config(DistributedConfig::new().with_worker_name_prefix(""))
        .with_spawner(Arc::new(RefusingSpawner))
        .run(Role::Coordinator)
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Configuration);
}

#[tokio::test]
async fn test_best_effort_cancellation_skips_pending_workers() {
    let err = DistributedExecutor::new(first_element_fails)
        .with_config(DistributedConfig::new().with_cancellation(CancellationPolicy::BestEffort))
        .with_spawner(Arc::new(SerialSpawner::new()))
        .run(Role::Coordinator)
        .await
        .unwrap_err();

    assert!(matches!(err.root_cause(), PipelineError::Raised(m) if m == "first element failed"));
    assert_eq!(CANCELLED_RUNS.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_default_policy_lets_siblings_finish() {
    let err = DistributedExecutor::new(first_fails_siblings_slow)
        .with_spawner(Arc::new(SerialSpawner::new()))
        .run(Role::Coordinator)
        .await
        .unwrap_err();

    assert!(matches!(err.root_cause(), PipelineError::Raised(m) if m == "first element failed"));
    assert!(SIBLING_RUNS.load(Ordering::SeqCst) < 10);

    let deadline = Instant::now() + Duration::from_secs(10);
    while SIBLING_RUNS.load(Ordering::SeqCst) < 10 {
        assert!(Instant::now() < deadline, "siblings stopped after the failure");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(SIBLING_RUNS.load(Ordering::SeqCst), 10);
}

#[tokio::test]
async fn test_worker_rejects_path_to_transform() {
    let (start, receiver) = worker_start(vec![0], json!(1));
    run_distributed(transform_only, Role::Worker(start)).await.unwrap();

    let reply = Reply::decode(&receiver.await.unwrap()).unwrap();
    assert_eq!(reply.error.as_ref().map(|e| e.kind), Some(FailureKind::Protocol));
    assert!(matches!(reply.into_result(), Err(PipelineError::Protocol(_))));
}

#[tokio::test]
async fn test_worker_rejects_hop_through_non_apply() {
    let (start, receiver) = worker_start(vec![0, 0], json!(1));
    run_distributed(increments, Role::Worker(start)).await.unwrap();

    let err = Reply::decode(&receiver.await.unwrap()).unwrap().into_result().unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Protocol);
}

#[tokio::test]
async fn test_worker_rejects_out_of_range_path() {
    let (start, receiver) = worker_start(vec![7], json!(1));
    run_distributed(increments, Role::Worker(start)).await.unwrap();

    let err = Reply::decode(&receiver.await.unwrap()).unwrap().into_result().unwrap_err();
    assert!(matches!(err, PipelineError::Protocol(_)));
}

#[tokio::test]
async fn test_worker_reports_undecodable_start_message() {
    let (reply, receiver) = ReplyPort::channel();
    let start = WorkerStart {
        name: "multitask-worker-0".to_string(),
        payload: "{\"pointers\": [0]}".to_string(),
        reply,
        cancel: CancelFlag::default(),
    };
    run_distributed(increments, Role::Worker(start)).await.unwrap();

    let reply = Reply::decode(&receiver.await.unwrap()).unwrap();
    assert_eq!(reply.error.as_ref().map(|e| e.kind), Some(FailureKind::Malformed));
}
