//! End-to-end scenario suite seeded directly from the six worked examples of the cooperative
//! runtime core's behavior: a sleep that blocks for roughly the requested duration, a trampoline
//! that times out on a silent fd and one that resumes once its peer writes, a killed task whose
//! drop glue runs, a rejected duplicate listener registration, and a `Timeout` scope around a
//! slower sleep. Each test below exercises the public surface re-exported by this crate rather
//! than any one component in isolation.

use std::cell::Cell;
use std::io::Write;
use std::os::fd::AsRawFd;
use std::rc::Rc;
use std::time::{Duration, Instant};

use greenhub::{gyield, kill, sleep, spawn, spawn_n, trampoline, Cancellation, Direction, Hub, HubConfig, Timeout};

fn borrowed_hub() -> Hub {
    Hub::new(HubConfig::default())
}

// S1: `t0 = now(); sleep(0.1); assert 0.09 <= now()-t0 <= 0.5`.
#[tokio::test]
async fn s1_sleep_blocks_for_roughly_the_requested_duration() {
    let hub = borrowed_hub();
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

// S2: pipe (r, w); a task trampolines on READ with a 0.05s timeout and nobody ever writes to w.
// The task's trampoline call raises within 0.04-0.5s, and afterward no listener for (READ, r)
// remains.
#[tokio::test]
async fn s2_trampoline_times_out_on_a_silent_pipe() {
    let hub = borrowed_hub();
    let (reader, _writer) = os_pipe::pipe().unwrap();
    let fd = reader.as_raw_fd();

    hub.clone()
        .drive(async move {
            let start = Instant::now();
            let task = spawn(&hub, {
                let hub = hub.clone();
                async move {
                    trampoline(&hub, fd, Direction::Read, Some(Duration::from_millis(50)), || ()).await
                }
            });
            let result = task.join().await.expect("task did not panic");
            let elapsed = start.elapsed();

            assert!(result.is_err());
            assert!(elapsed >= Duration::from_millis(40));
            assert!(elapsed <= Duration::from_millis(500));
            assert!(!hub.has_listener(Direction::Read, fd));
        })
        .await;
}

// S3: pipe (r, w); T1 trampolines on READ with no timeout, T2 writes one byte to w and exits.
// T1 resumes once the byte is written.
#[tokio::test]
async fn s3_trampoline_resumes_once_peer_writes() {
    let hub = borrowed_hub();
    let (reader, mut writer) = os_pipe::pipe().unwrap();
    let fd = reader.as_raw_fd();

    hub.clone()
        .drive(async move {
            let t1 = spawn(&hub, {
                let hub = hub.clone();
                async move { trampoline(&hub, fd, Direction::Read, None, || ()).await }
            });

            spawn_n(&hub, "writer", async move {
                writer.write_all(&[7u8]).unwrap();
            });

            let result = t1.join().await.expect("task did not panic");
            assert!(result.is_ok());
        })
        .await;
}

// S4: a task loops on gyield() until killed; kill(T, TaskExit) followed by one hub iteration
// leaves it dead with its drop glue (the "finally clause") having run.
#[tokio::test]
async fn s4_kill_delivers_task_exit_and_runs_drop_glue() {
    struct Finally(Rc<Cell<bool>>);
    impl Drop for Finally {
        fn drop(&mut self) {
            self.0.set(true);
        }
    }

    let hub = borrowed_hub();
    let ran_finally = Rc::new(Cell::new(false));

    hub.clone()
        .drive(async move {
            let flag = ran_finally.clone();
            let hub_for_task = hub.clone();
            let task = spawn(&hub, async move {
                let _finally = Finally(flag);
                loop {
                    gyield(&hub_for_task).await;
                }
            });

            gyield(&hub).await;
            kill(&task);

            let result = task.join().await;
            assert!(matches!(result, Err(Cancellation::TaskExit)));
            assert!(ran_finally.get());
        })
        .await;
}

// S5: hub.add(READ, fd) twice for the same fd; the second raises a registration error and the
// first listener remains intact.
#[tokio::test]
async fn s5_duplicate_listener_registration_is_rejected() {
    let hub = borrowed_hub();
    let (reader, _writer) = os_pipe::pipe().unwrap();
    let fd = reader.as_raw_fd();

    hub.clone()
        .drive(async move {
            let first = hub.add(Direction::Read, fd).expect("first registration succeeds");
            let second = hub.add(Direction::Read, fd);

            assert!(second.is_err());
            assert!(hub.has_listener(Direction::Read, fd));
            drop(first);
            assert!(!hub.has_listener(Direction::Read, fd));
        })
        .await;
}

// S6: `with Timeout(0.05): sleep(1.0)` raises Timeout within 0.04-0.5s; no timer remains armed
// once the scoped block exits.
#[tokio::test]
async fn s6_timeout_scope_around_a_slower_sleep() {
    let hub = borrowed_hub();

    hub.clone()
        .drive(async move {
            let start = Instant::now();
            let timeout = Timeout::new(Some(0.05));
            let result = timeout.run(sleep(&hub, 1.0)).await;
            let elapsed = start.elapsed();

            assert!(result.is_err());
            assert!(elapsed >= Duration::from_millis(40));
            assert!(elapsed <= Duration::from_millis(500));
        })
        .await;
}
