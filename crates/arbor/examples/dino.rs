//! Dino — the endless runner, in a window.
//!
//! - **Space / Enter** — start from the title screen
//! - **Space / Up** — jump; after a crash, restart the round
//! - **Escape** — back to the title, or quit from it
//!
//! Drop a 4-frame `dino.png` strip (44x47 frames) into `assets/` to replace
//! the block with a sprite.
//!
//! Run with: `cargo run -p arbor --example dino --features window`

mod common;

use std::process::ExitCode;

use arbor::prelude::*;

fn main() -> ExitCode {
    #[cfg(feature = "diagnostics")]
    arbor::diag::init_logger();
    #[cfg(not(feature = "diagnostics"))]
    env_logger::init();

    let config = match std::env::args().nth(1) {
        Some(path) => match RootConfig::from_file(&path) {
            Ok(config) => config,
            Err(err) => {
                log::error!("{err}");
                return ExitCode::FAILURE;
            }
        },
        None => RootConfig::new("game").with_title("Dino"),
    };

    let mut root = match Root::windowed(config) {
        Ok(root) => root,
        Err(err) => {
            log::error!("{err}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(err) = root.attach("scenes", common::scenes()) {
        log::error!("{err}");
        return ExitCode::FAILURE;
    }
    root.run()
}
