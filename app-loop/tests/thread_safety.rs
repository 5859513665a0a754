use app_loop::headless::{HeadlessPlatform, Journal};
use app_loop::{FnHandler, QueueExecutor, QuitHandle, QuitSignal, Runner, RunnerContext, Wait};
use static_assertions::{assert_impl_all, assert_not_impl_any};

type UpdateFn = fn(&mut RunnerContext<'_, HeadlessPlatform>, &app_loop::FrameContext) -> app_loop::Flow;

// Compile-time checks for Send/Sync markers
#[test]
fn quit_signal_crosses_threads() {
    // Fired on the native loop thread, awaited anywhere
    assert_impl_all!(QuitSignal: Send, Sync);
    assert_impl_all!(QuitHandle: Send, Sync, Clone);
    assert_impl_all!(Wait<'static>: Send);
    assert_impl_all!(Journal: Send, Sync);
}

#[test]
fn runner_and_executor_stay_on_their_thread() {
    // The runner is bound to the thread that entered the native loop
    assert_not_impl_any!(Runner<HeadlessPlatform, FnHandler<HeadlessPlatform, UpdateFn>>: Send, Sync);

    // Tasks are `!Send` futures polled by the owning thread
    assert_not_impl_any!(QueueExecutor: Send, Sync);
}
