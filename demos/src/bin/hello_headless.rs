//! Runs a scripted session without a display.
//!
//! An async task waits for the quit signal while the update hook pumps the
//! executor once per frame. The escape key at frame 90 ends the session.

use std::rc::Rc;
use std::time::Duration;

use app_loop::headless::{HeadlessEvent, HeadlessPlatform, Key};
use app_loop::{
    FpsCounter, Flow, FrameContext, Handler, QueueExecutor, Runner, RunnerContext, logging,
};
use tracing::info;

struct Demo {
    executor: Rc<QueueExecutor>,
    fps: FpsCounter,
}

impl Handler<HeadlessPlatform> for Demo {
    fn start(&mut self, ctx: &mut RunnerContext<'_, HeadlessPlatform>) -> bool {
        let quit = ctx.quit_handle();
        self.executor.spawn(async move {
            let code = quit.wait_quit().await;
            info!(code, "quit observed from async task");
        });
        true
    }

    fn update(
        &mut self,
        _ctx: &mut RunnerContext<'_, HeadlessPlatform>,
        frame: &FrameContext,
    ) -> Flow {
        self.fps.add_frame(frame.delta_seconds());
        if frame.frame_index % 30 == 0 {
            logging::log_frame_stats(frame.delta_seconds(), self.fps.average_fps());
        }
        self.executor.run_until_stalled();
        Flow::Continue
    }

    fn event(
        &mut self,
        _ctx: &mut RunnerContext<'_, HeadlessPlatform>,
        event: &HeadlessEvent,
    ) -> Flow {
        info!(?event, "event");
        Flow::Continue
    }

    fn stop(&mut self, ctx: &mut RunnerContext<'_, HeadlessPlatform>) {
        // Let the waiting task observe the exit code before the runner goes away.
        self.executor.run_until_stalled();
        info!(frames = ctx.frame().frame_index, "stopped");
    }
}

fn main() {
    logging::init_tracing();

    let platform = HeadlessPlatform::new()
        .with_frame_step(Duration::from_millis(16))
        .with_event(45, HeadlessEvent::Resized {
            width: 1024,
            height: 768,
        })
        .with_event(90, HeadlessEvent::KeyDown(Key::Escape))
        .with_max_frames(600);

    let demo = Demo {
        executor: Rc::new(QueueExecutor::new()),
        fps: FpsCounter::default(),
    };
    let code = Runner::builder(platform, demo)
        .with_title("hello_headless")
        .on_inited(|ctx| {
            info!(title = ?ctx.window().map(|w| w.title()), "window ready");
            true
        })
        .run();

    info!(code, "exiting");
    std::process::exit(code);
}
