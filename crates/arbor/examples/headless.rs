//! Headless — the dino game driven by a scripted backend.
//!
//! Presses Space to leave the title screen, then jumps on a fixed rhythm for
//! a simulated ten seconds and prints what happened. Useful on machines
//! without a GPU and as a smoke test of the whole frame loop.
//!
//! Run with: `cargo run -p arbor --example headless`

mod common;

use std::process::ExitCode;

use arbor::prelude::*;

const FRAMES: u64 = 600;
const JUMP_EVERY: u64 = 45;

fn main() -> ExitCode {
    env_logger::init();

    let config = RootConfig::new("game")
        .with_title("Dino (headless)")
        .with_frame_delay_ms(0)
        .with_fixed_step_ms(16);

    let mut backend = HeadlessBackend::new(config.width, config.height);
    backend.push_frame([InputEvent::KeyDown(Key::Space)]);
    backend.push_frame([InputEvent::KeyUp(Key::Space)]);
    for frame in 2..FRAMES {
        match frame % JUMP_EVERY {
            0 => backend.push_frame([InputEvent::KeyDown(Key::Space)]),
            1 => backend.push_frame([InputEvent::KeyUp(Key::Space)]),
            _ => backend.push_frame([]),
        }
    }

    let mut root = Root::new(config, backend);
    if let Err(err) = root.attach("scenes", common::scenes()) {
        log::error!("{err}");
        return ExitCode::FAILURE;
    }

    let ran = match root.run_frames(FRAMES) {
        Ok(ran) => ran,
        Err(err) => {
            log::error!("frame aborted: {err}");
            return ExitCode::FAILURE;
        }
    };

    let tree = root.tree();
    let bb = &tree.services().blackboard;
    println!("{}", tree.dump());
    println!(
        "frames: {ran}  simulated: {:.1}s  score: {}  best: {}",
        root.time().elapsed_secs(),
        bb.get("score", 0.0) as u32,
        bb.get("best", 0.0) as u32,
    );
    println!(
        "colliders: {}  render rebuilds: {}  last frame: {} draw commands",
        tree.services().collisions.len(),
        tree.render_rebuilds(),
        root.stats().draw_commands,
    );
    ExitCode::SUCCESS
}
