//! Opens an SDL3 window and clears it to a pulsing color until closed.
//!
//! Escape or closing the window quits. After ten seconds the demo asks the
//! runner to exit with code 0 on its own.

use app_loop::{FpsCounter, Flow, Runner, RunnerContext, VSync, from_update, logging};
use app_loop_sdl3::Sdl3Platform;
use tracing::info;

fn main() {
    logging::init_tracing();

    let mut fps = FpsCounter::default();
    let handler = from_update(move |ctx: &mut RunnerContext<'_, Sdl3Platform>, frame| {
        fps.add_frame(frame.delta_seconds());
        if frame.frame_index % 120 == 0 {
            logging::log_frame_stats(frame.delta_seconds(), fps.average_fps());
        }
        if frame.elapsed_seconds() > 10.0 {
            ctx.exit(0);
        }
        Flow::Continue
    });

    let code = Runner::builder(Sdl3Platform::new(), handler)
        .with_title(format!("hello_sdl3 - {}", env!("CARGO_PKG_VERSION")))
        .with_window_size(1280, 720)
        .with_vsync(VSync::Enabled)
        .on_render(|renderer, frame| {
            let t = frame.elapsed_seconds() as f32;
            let level = (0.5 + 0.5 * t.sin()) * 255.0;
            // SAFETY: the renderer is alive for the duration of the callback.
            unsafe {
                let raw = renderer.raw();
                sdl3_sys::render::SDL_SetRenderDrawColor(raw, 32, level as u8, 96, 255);
                sdl3_sys::render::SDL_RenderClear(raw);
            }
        })
        .on_quitting(|ctx| info!(frames = ctx.frame().frame_index, "quitting"))
        .run();

    std::process::exit(code);
}
