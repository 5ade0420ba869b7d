//! Thermal diffusion CLI - Run a scripted session from JSON configuration.

use std::path::PathBuf;
use std::time::Instant;

use thermal_diffusion::{
    compute::{
        Backend, CpuBackend, FilterMode, TextureFormat, TextureHandle, WrapMode, buffers,
        gpu::WgpuBackend,
    },
    schema::{FrameInput, SessionConfig, Viewport},
    simulation::{FieldStats, Simulation, SimulationError},
};

/// Fixed viewport of the scripted session.
const VIEWPORT: Viewport = Viewport::new(800, 600);

/// Wall-clock time reported per frame.
const FRAME_DT: f32 = 1.0 / 60.0;

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <config.json> [frames]", args[0]);
        eprintln!();
        eprintln!("Run a headless thermal diffusion session from JSON configuration.");
        eprintln!();
        eprintln!("Arguments:");
        eprintln!("  config.json  Path to session configuration file");
        eprintln!("  frames       Number of frames to run (default: 120)");
        eprintln!();
        eprintln!("Example configuration is printed with --example flag.");
        std::process::exit(1);
    }

    if args[1] == "--example" {
        print_example_config();
        return;
    }

    let config_path = PathBuf::from(&args[1]);
    let frames: u64 = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(120);

    let config = SessionConfig::load(&config_path).unwrap_or_else(|e| {
        eprintln!("Error loading config: {}", e);
        std::process::exit(1);
    });

    println!("Thermal Diffusion Session");
    println!("=========================");
    println!("Viewport: {}x{}", VIEWPORT.width, VIEWPORT.height);
    println!(
        "Field LOD: {} ({}x{})",
        config.solver.lod,
        VIEWPORT.scaled(config.solver.lod).0,
        VIEWPORT.scaled(config.solver.lod).1
    );
    println!(
        "Diffusion: coef={}, dt={}, iterations={}, stability={:.3}",
        config.solver.thermal_diffuse_coef,
        config.solver.delta_time,
        config.solver.iteration,
        config.solver.stability_number()
    );
    println!("Effect passes: {}", config.effect.passes.len());
    println!("Frames: {}", frames);
    println!();

    let result = match pollster::block_on(WgpuBackend::new()) {
        Ok(backend) => run(backend, config, frames),
        Err(e) => {
            log::warn!("GPU backend unavailable ({}); using the CPU backend", e);
            run(CpuBackend::new(), config, frames)
        }
    };

    if let Err(e) = result {
        eprintln!("Simulation failed: {}", e);
        std::process::exit(1);
    }
}

fn run<B: Backend>(backend: B, config: SessionConfig, frames: u64) -> Result<(), SimulationError> {
    println!("Backend: {}", backend.name());
    let mut sim = Simulation::new(backend, config, VIEWPORT)?;

    let (frame, display) = synthetic_frame(sim.backend_mut())?;

    println!("Running session...");
    let start = Instant::now();

    for i in 0..frames {
        let input = scripted_input(i, frames);
        sim.step(&input, FRAME_DT)?;
        sim.composite(&input, &frame, &display)?;

        // Print progress every 10%
        if (i + 1) % (frames / 10).max(1) == 0 {
            let stats = FieldStats::of(&sim.read_field()?);
            let elapsed = start.elapsed().as_secs_f32();
            println!(
                "  Frame {}/{}: total={:.4}, max={:.6}, mean={:.6}, {:.1} frames/s",
                i + 1,
                frames,
                stats.total,
                stats.max,
                stats.mean,
                (i + 1) as f32 / elapsed
            );
        }
    }

    let elapsed = start.elapsed();
    let stats = FieldStats::of(&sim.read_field()?);

    println!();
    println!("Final field:");
    println!("  Total heat: {:.6}", stats.total);
    println!("  Max: {:.6}", stats.max);
    println!("  Mean: {:.6}", stats.mean);
    println!(
        "Time: {:.2}s ({:.1} frames/s)",
        elapsed.as_secs_f32(),
        frames as f32 / elapsed.as_secs_f32()
    );

    let mut backend = sim.shutdown();
    backend.release_texture(&frame);
    backend.release_texture(&display);
    Ok(())
}

/// Pointer held for the first half of the run, circling the viewport centre.
fn scripted_input(frame: u64, frames: u64) -> FrameInput {
    let input = FrameInput::new(VIEWPORT);
    if frame >= frames / 2 {
        return input;
    }
    let angle = frame as f32 * 0.1;
    let radius = VIEWPORT.height as f32 * 0.25;
    let x = VIEWPORT.width as f32 * 0.5 + radius * angle.cos();
    let y = VIEWPORT.height as f32 * 0.5 + radius * angle.sin();
    input.with_pointer_down([x, y])
}

/// Colour frame fed to the compositor, and the display it composites into.
fn synthetic_frame<B: Backend>(
    backend: &mut B,
) -> Result<(TextureHandle, TextureHandle), SimulationError> {
    let acquire = |backend: &mut B| {
        buffers::acquire(
            backend,
            VIEWPORT.width,
            VIEWPORT.height,
            0,
            TextureFormat::ARGBFloat,
            WrapMode::Clamp,
            FilterMode::Bilinear,
            None,
        )
    };
    let frame = acquire(backend)?;
    let display = acquire(backend)?;

    let (w, h) = (VIEWPORT.width as usize, VIEWPORT.height as usize);
    let mut pixels = Vec::with_capacity(w * h * 4);
    for y in 0..h {
        for x in 0..w {
            pixels.extend_from_slice(&[x as f32 / w as f32, y as f32 / h as f32, 0.5, 1.0]);
        }
    }
    backend.upload(&frame, &pixels)?;
    Ok((frame, display))
}

fn print_example_config() {
    let config = SessionConfig::default();
    match serde_json::to_string_pretty(&config) {
        Ok(json) => {
            println!("Example configuration (config.json):");
            println!("{}", json);
        }
        Err(e) => eprintln!("Error serializing config: {}", e),
    }
}
