use app_loop::headless::HeadlessPlatform;
use app_loop::{
    Flow, FrameContext, Handler, QueueExecutor, QuitHandle, QuitSignal, Runner, RunnerContext,
};
use futures::FutureExt;
use std::rc::Rc;
use std::sync::{Arc, Barrier};
use std::thread;

#[test]
fn first_fire_wins() {
    let signal = QuitSignal::new();
    assert!(!signal.is_fired());
    assert_eq!(signal.code(), None);

    assert!(signal.fire(5));
    assert!(!signal.fire(7));
    assert!(!signal.fire(5));
    assert_eq!(signal.code(), Some(5));
}

#[test]
fn concurrent_fires_store_exactly_one_code() {
    let handle = QuitHandle::new();
    let barrier = Arc::new(Barrier::new(8));
    let winners: Vec<_> = (0..8)
        .map(|code| {
            let handle = handle.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                handle.exit(code).then_some(code)
            })
        })
        .collect::<Vec<_>>()
        .into_iter()
        .filter_map(|t| t.join().unwrap())
        .collect();

    assert_eq!(winners.len(), 1);
    assert_eq!(handle.code(), Some(winners[0]));
}

#[test]
fn wait_after_fire_resolves_without_suspending() {
    let signal = QuitSignal::new();
    signal.fire(4);
    assert_eq!(signal.wait().now_or_never(), Some(4));
    assert_eq!(signal.waiter_count(), 0);

    // One poll, no extra scheduler tick.
    let executor = QueueExecutor::new();
    let handle = QuitHandle::new();
    handle.exit(4);
    let waiter = handle.clone();
    let task = executor.spawn(async move { waiter.wait_quit().await });
    assert!(executor.run_once());
    assert_eq!(executor.ticks(), 1);
    assert_eq!(task.take_output(), Some(4));
    assert!(executor.is_empty());
}

#[test]
fn wait_before_fire_suspends_then_resumes() {
    let executor = QueueExecutor::new();
    let handle = QuitHandle::new();

    let tasks: Vec<_> = (0..3)
        .map(|_| {
            let waiter = handle.clone();
            executor.spawn(async move { waiter.wait_quit().await })
        })
        .collect();

    assert_eq!(executor.run_until_stalled(), 3);
    assert_eq!(executor.pending(), 3);
    assert_eq!(handle.signal().waiter_count(), 3);
    assert!(tasks.iter().all(|task| !task.is_finished()));

    assert!(handle.exit(2));
    assert_eq!(handle.signal().waiter_count(), 0);
    assert_eq!(executor.run_until_stalled(), 3);
    for task in &tasks {
        assert_eq!(task.take_output(), Some(2));
    }
    assert!(executor.is_empty());

    // Firing again is a no-op and wakes nobody.
    assert!(!handle.exit(9));
    assert_eq!(executor.run_until_stalled(), 0);
}

#[test]
fn fire_from_another_thread_wakes_blocked_waiter() {
    let handle = QuitHandle::new();
    let waiter = handle.clone();
    let blocked = thread::spawn(move || pollster::block_on(waiter.wait_quit()));

    let firing = handle.clone();
    thread::spawn(move || firing.exit(13)).join().unwrap();
    assert_eq!(blocked.join().unwrap(), 13);
}

#[test]
fn executor_parks_until_remote_fire() {
    let executor = QueueExecutor::new();
    let handle = QuitHandle::new();
    let remote = handle.clone();
    let firing = thread::spawn(move || {
        thread::sleep(std::time::Duration::from_millis(20));
        remote.exit(21)
    });

    let waiter = handle.clone();
    assert_eq!(executor.block_on(async move { waiter.wait_quit().await }), 21);
    assert!(firing.join().unwrap());
}

#[test]
fn abandoned_wait_is_cleared() {
    let executor = QueueExecutor::new();
    let handle = QuitHandle::new();
    let waiter = handle.clone();
    let task = executor.spawn(async move {
        let wait = waiter.wait_quit();
        futures::pin_mut!(wait);
        // Poll once, then give up.
        futures::future::poll_fn(|cx| {
            let _ = wait.as_mut().poll(cx);
            std::task::Poll::Ready(())
        })
        .await;
    });

    executor.run_until_stalled();
    assert!(task.is_finished());
    assert_eq!(handle.signal().waiter_count(), 0);
    assert!(handle.exit(1));
}

/// Drives a cooperative executor from the update hook.
struct Pumping {
    executor: Rc<QueueExecutor>,
}

impl Handler<HeadlessPlatform> for Pumping {
    fn update(
        &mut self,
        _ctx: &mut RunnerContext<'_, HeadlessPlatform>,
        _frame: &FrameContext,
    ) -> Flow {
        self.executor.run_until_stalled();
        Flow::Continue
    }
}

#[test]
fn task_waiting_on_runner_resumes_with_exit_code() {
    let executor = Rc::new(QueueExecutor::new());
    let handle = QuitHandle::new();

    let waiter = handle.clone();
    let waited = executor.spawn(async move { waiter.wait_quit().await });
    let requester = handle.clone();
    let requested = executor.spawn(async move {
        // Yield once before asking the runner to stop.
        let mut yielded = false;
        futures::future::poll_fn(|cx| {
            if yielded {
                std::task::Poll::Ready(())
            } else {
                yielded = true;
                cx.waker().wake_by_ref();
                std::task::Poll::Pending
            }
        })
        .await;
        requester.exit(6)
    });

    let platform = HeadlessPlatform::new().with_max_frames(10);
    let journal = platform.journal();
    let code = Runner::builder(
        platform,
        Pumping {
            executor: executor.clone(),
        },
    )
    .with_quit_handle(handle.clone())
    .run();

    assert_eq!(code, 6);
    assert_eq!(requested.take_output(), Some(true));
    // The exit was requested during the first frame's pump, which is not presented.
    assert_eq!(journal.presents(), 0);

    // The fire re-queued the waiter within the same pump.
    assert_eq!(executor.run_until_stalled(), 0);
    assert_eq!(waited.take_output(), Some(6));
    assert!(executor.is_empty());
}

#[test]
fn runner_wait_quit_after_termination_is_immediate() {
    let handler = app_loop::from_update(|ctx: &mut RunnerContext<'_, HeadlessPlatform>, _| {
        ctx.exit(8);
        Flow::Continue
    });
    let mut runner = Runner::new(HeadlessPlatform::new(), handler);
    assert_eq!(runner.run(), 8);
    assert_eq!(runner.wait_quit().now_or_never(), Some(8));
    assert!(!runner.is_running());
}

#[test]
fn failed_run_still_fires_the_signal() {
    let handler = app_loop::from_update(|_: &mut RunnerContext<'_, HeadlessPlatform>, _| {
        Flow::Continue
    });
    let mut runner = Runner::new(HeadlessPlatform::new().failing_window(), handler);
    let quit = runner.quit_handle();
    let waiter = quit.clone();
    let blocked = thread::spawn(move || pollster::block_on(waiter.wait_quit()));

    assert_eq!(runner.run(), app_loop::EXIT_FAILURE);
    assert_eq!(blocked.join().unwrap(), app_loop::EXIT_FAILURE);
}
