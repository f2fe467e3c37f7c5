//! Reaction Diffusion CLI - Run simulations from JSON configuration.

#[cfg(feature = "dhat-heap")]
#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use reaction_diffusion::{
    compute::{
        BufferRole, BufferSettings, ComputeProgram, CpuProgram, GridStats, Simulation,
        gpu::{GpuError, GpuProgram},
    },
    driver::FrameDriver,
    schema::SimulationConfig,
};

/// Simulated display rate.
const FRAME_RATE: u32 = 60;

fn main() {
    #[cfg(feature = "dhat-heap")]
    let _profiler = dhat::Profiler::new_heap();

    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <config.json> [frames] [--cpu]", args[0]);
        eprintln!();
        eprintln!("Run a reaction-diffusion simulation from JSON configuration.");
        eprintln!();
        eprintln!("Arguments:");
        eprintln!("  config.json  Path to simulation configuration file");
        eprintln!("  frames       Number of display frames at {FRAME_RATE} fps (default: 600)");
        eprintln!("  --cpu        Use the CPU program instead of the GPU");
        eprintln!();
        eprintln!("Example configuration is generated with --example flag.");
        std::process::exit(1);
    }

    if args[1] == "--example" {
        print_example_config();
        return;
    }

    let config_path = PathBuf::from(&args[1]);
    let force_cpu = args.iter().any(|a| a == "--cpu");
    let frames: u32 = args
        .iter()
        .skip(2)
        .find_map(|s| s.parse().ok())
        .unwrap_or(600);

    let config = SimulationConfig::load(&config_path).unwrap_or_else(|e| {
        eprintln!("Error loading config: {}", e);
        std::process::exit(1);
    });

    println!("Reaction Diffusion Simulation");
    println!("=============================");
    let params = &config.parameters;
    println!("Grid: {}x{}", params.width, params.height);
    println!(
        "Feed: {}, remove: {}, diffusion: ({}, {}), radius: {}",
        params.feed_rate,
        params.remove_rate,
        params.diffuse_rate_a,
        params.diffuse_rate_b,
        params.diffuse_radius
    );
    println!(
        "Cadence: {} steps/tick at {} ticks/s",
        config.steps_per_tick, config.tick_rate
    );
    println!("Frames: {}", frames);
    println!();

    if force_cpu {
        println!("Backend: CPU");
        run(CpuProgram::new(), &config, frames);
        return;
    }

    match pollster::block_on(GpuProgram::new(config.pixel_format)) {
        Ok(program) => {
            println!("Backend: GPU");
            run(program, &config, frames);
        }
        Err(GpuError::NoAdapter) => {
            println!("Backend: CPU (no GPU adapter available)");
            run(CpuProgram::new(), &config, frames);
        }
        Err(e) => {
            eprintln!("Error creating GPU program: {}", e);
            std::process::exit(1);
        }
    }
}

fn run<P: ComputeProgram>(program: P, config: &SimulationConfig, frames: u32) {
    let params = &config.parameters;
    let init_map = config.seed.generate(params.width, params.height);

    let mut sim = Simulation::new(program, &init_map, BufferSettings::from_config(config))
        .unwrap_or_else(|e| {
            eprintln!("Error creating simulation: {}", e);
            std::process::exit(1);
        });
    sim.init(params).unwrap_or_else(|e| {
        eprintln!("Error initializing simulation: {}", e);
        std::process::exit(1);
    });

    println!();
    print_stats("Initial state", &sim);

    let mut driver = FrameDriver::from_config(config);
    let frame_time = Duration::from_secs(1) / FRAME_RATE;

    println!("Running simulation...");
    let start = Instant::now();
    let mut refreshes = 0u32;
    let mut dropped = 0u32;

    for i in 0..frames {
        let report = driver
            .frame(&mut sim, params, frame_time)
            .unwrap_or_else(|e| {
                eprintln!("Error in frame {}: {}", i, e);
                std::process::exit(1);
            });
        refreshes += report.refreshed as u32;
        dropped += report.dropped_ticks;

        // Print progress every 10%
        if (i + 1) % (frames / 10).max(1) == 0 {
            let elapsed = start.elapsed().as_secs_f32();
            println!(
                "  Frame {}/{}: step {}, {:.1} steps/s",
                i + 1,
                frames,
                sim.steps(),
                sim.steps() as f32 / elapsed
            );
        }
    }

    let elapsed = start.elapsed();
    println!();
    print_stats("Final state", &sim);
    println!("Refreshes: {} ({} ticks dropped)", refreshes, dropped);
    println!(
        "Time: {:.2}s ({:.1} steps/s)",
        elapsed.as_secs_f32(),
        sim.steps() as f32 / elapsed.as_secs_f32()
    );
}

fn print_stats<P: ComputeProgram>(label: &str, sim: &Simulation<P>) {
    println!("{}:", label);
    match sim.read_buffer(BufferRole::Current) {
        Ok(pixels) => {
            let stats = GridStats::from_pixels(&pixels);
            println!(
                "  A: mean {:.6}, range [{:.6}, {:.6}]",
                stats.mean[0], stats.min[0], stats.max[0]
            );
            println!(
                "  B: mean {:.6}, range [{:.6}, {:.6}]",
                stats.mean[1], stats.min[1], stats.max[1]
            );
        }
        Err(e) => println!("  (unavailable: {})", e),
    }
    println!();
}

fn print_example_config() {
    let config = SimulationConfig::default();

    println!("Example configuration (config.json):");
    match serde_json::to_string_pretty(&config) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error serializing config: {}", e);
            std::process::exit(1);
        }
    }
}
