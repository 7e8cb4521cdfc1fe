use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use hub::{Hub, HubConfig};

use crate::{kill, spawn, spawn_n, sleep, Cancellation};

fn test_hub() -> Hub {
    Hub::new(HubConfig::default())
}

// S1: sleep(t) blocks for at least roughly t.
#[tokio::test]
async fn sleep_blocks_for_the_requested_duration() {
    let hub = test_hub();
    hub.clone()
        .drive(async move {
            let start = Instant::now();
            sleep(&hub, 0.1).await;
            let elapsed = start.elapsed();
            assert!(elapsed >= Duration::from_millis(90));
            assert!(elapsed <= Duration::from_millis(500));
        })
        .await;
}

// Round-trip: spawn(fn).join() == fn() for a deterministic fn that yields at least once.
#[tokio::test]
async fn spawn_roundtrips_result() {
    let hub = test_hub();
    hub.clone()
        .drive(async move {
            let task = spawn(&hub, async {
                tokio::task::yield_now().await;
                2 + 2
            });
            assert_eq!(task.join().await.unwrap(), 4);
        })
        .await;
}

struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

// S4: kill() delivers TaskExit and the task's drop glue ("finally clauses") runs.
#[tokio::test]
async fn kill_delivers_task_exit_and_runs_drop_glue() {
    let hub = test_hub();
    hub.clone()
        .drive(async move {
            let dropped = Arc::new(AtomicBool::new(false));
            let dropped_in_task = dropped.clone();

            let looping = spawn(&hub, async move {
                let _guard = DropFlag(dropped_in_task);
                loop {
                    tokio::task::yield_now().await;
                }
            });

            tokio::task::yield_now().await;
            kill(&looping);

            let result = looping.join().await;
            assert!(matches!(result, Err(Cancellation::TaskExit)));
            assert!(dropped.load(Ordering::SeqCst));
        })
        .await;
}

#[tokio::test]
async fn kill_of_already_dead_task_is_a_noop() {
    let hub = test_hub();
    hub.clone()
        .drive(async move {
            let task = spawn(&hub, async { 1 });
            // Let it finish.
            tokio::task::yield_now().await;
            tokio::task::yield_now().await;
            kill(&task);
            assert_eq!(task.join().await.unwrap(), 1);
        })
        .await;
}

#[tokio::test]
async fn spawn_n_logs_panics_but_does_not_propagate_them() {
    let hub = test_hub();
    hub.clone()
        .drive(async move {
            let ran = Arc::new(AtomicUsize::new(0));
            let ran_in_task = ran.clone();
            let _handle = spawn_n(&hub, "boom", async move {
                ran_in_task.fetch_add(1, Ordering::SeqCst);
                panic!("deliberate test panic");
            });
            // Give the fire-and-forget task (and its watcher) a chance to run.
            for _ in 0..4 {
                tokio::task::yield_now().await;
            }
            assert_eq!(ran.load(Ordering::SeqCst), 1);
        })
        .await;
}
