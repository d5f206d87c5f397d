//! `pbd-cloth [scene.json] [params.json]`
//!
//! `--headless <frames>` runs the scene on the CPU solver without a window
//! and prints where each cloth ended up.

use std::path::PathBuf;
use std::process::ExitCode;

use pbd_cloth::app::{self, AppConfig};
use pbd_cloth::prelude::*;

struct Args {
    config: AppConfig,
    headless: Option<u32>,
}

fn parse_args() -> Result<Args, String> {
    let mut config = AppConfig::default();
    let mut headless = None;
    let mut positional = Vec::new();

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--headless" => {
                let frames = args.next().ok_or("--headless needs a frame count")?;
                headless = Some(frames.parse().map_err(|_| format!("invalid frame count '{}'", frames))?);
            }
            "-h" | "--help" => {
                return Err("usage: pbd-cloth [--headless <frames>] [scene.json] [params.json]".into());
            }
            _ => positional.push(PathBuf::from(arg)),
        }
    }
    let mut positional = positional.into_iter();
    config.scene = positional.next();
    config.params = positional.next();
    Ok(Args { config, headless })
}

fn run_headless(config: &AppConfig, frames: u32) -> Result<(), Box<dyn std::error::Error>> {
    let mut textures = TextureCache::new();
    let mut scene = match &config.scene {
        Some(path) => Scene::load(path, &mut textures)?,
        None => Scene::default_scene(&mut textures)?,
    };
    let params = match &config.params {
        Some(path) => ClothSimParams::load(path)?,
        None => ClothSimParams::default(),
    };

    let mut solver = CpuSolver::from_cloths(scene.take_cloths().into_iter().map(|entry| entry.cloth));
    let start = std::time::Instant::now();
    for _ in 0..frames {
        solver.step(&params, &scene.planes, None)?;
    }
    let elapsed = start.elapsed();

    log::info!(
        "{} frames in {:.1} ms ({:.3} ms/frame)",
        frames,
        elapsed.as_secs_f64() * 1000.0,
        elapsed.as_secs_f64() * 1000.0 / frames.max(1) as f64
    );
    for (i, cloth) in solver.cloths().iter().enumerate() {
        let lowest = cloth.positions().iter().map(|p| p.y).fold(f32::INFINITY, f32::min);
        println!("cloth {}: {} vertices, lowest y = {:.4}", i, cloth.num_vertices(), lowest);
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();

    let args = match parse_args() {
        Ok(args) => args,
        Err(msg) => {
            eprintln!("{}", msg);
            return ExitCode::FAILURE;
        }
    };

    let result = match args.headless {
        Some(frames) => run_headless(&args.config, frames),
        None => app::run(args.config).map_err(Into::into),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
