use std::env;

use anyhow::Result;
use clap::Parser;
use log::info;

use cytomech_sim::observers::{AttachmentObserver, BendingEnergyObserver, FiberLengthObserver, ObserversSet};
use cytomech_sim::{
    ConfineMode, ConfineProp, Couple, CoupleProp, Fiber, FiberProp, HandProp, Properties, SimContext, Simul,
    SimulProp, SpaceSphere,
};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
/// the main cytomech program
/// say cytomech -h to see options
struct Args {
    /// number of simulation steps
    #[clap(short, long, default_value_t = 1000)]
    steps: u64,
    /// number of fibers
    #[clap(short, long, default_value_t = 20)]
    fibers: usize,
    /// number of crosslinking couples
    #[clap(short, long, default_value_t = 200)]
    couples: usize,
    /// seed of the random number generator
    #[clap(long, default_value_t = 1)]
    seed: u64,
    /// be more verbose and log program actions on the screen
    #[clap(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    unsafe {
        if env::var("RUST_LOG").is_err() {
            env::set_var("RUST_LOG", "info")
        }
        if args.verbose {
            env::set_var("RUST_LOG", "debug");
        }
    }
    env_logger::init();

    let mut ctx = SimContext::new(args.seed);
    let mut sim = Simul::new(Properties::new(SimulProp { seed: args.seed, ..Default::default() }))?;

    // ---------- parameters
    let cell = sim.add_space(Box::new(SpaceSphere::new(5.0)));

    let mut hand = HandProp::new("binder");
    hand.binding_rate = 10.0;
    hand.binding_range = 0.02;
    hand.unbinding_rate = 0.3;
    hand.unbinding_force = 3.0;
    let hand = sim.properties.add_hand(hand)?;

    let mut couple = CoupleProp::new("crosslinker", hand.clone(), hand.clone());
    couple.stiffness = 100.0;
    couple.diffusion = 5.0;
    couple.fast_diffusion = true;
    couple.confine = Some(ConfineProp { space: cell, mode: ConfineMode::Inside, stiffness: 100.0 });
    let couple = sim.properties.add_couple(couple)?;

    let mut fiber = FiberProp::new("actin");
    fiber.rigidity = 0.075;
    fiber.segmentation = 0.25;
    fiber.confine = Some(ConfineProp { space: cell, mode: ConfineMode::Inside, stiffness: 200.0 });
    let fiber = sim.properties.add_fiber(fiber)?;

    // ---------- initial state
    for _ in 0..args.fibers {
        let pos = sim.spaces[cell].random_place(&mut ctx.rng);
        let dir = ctx.rng.unit_vector();
        sim.add_fiber(Fiber::new(fiber.clone(), pos, dir, 3.0));
    }
    for _ in 0..args.couples {
        let pos = sim.spaces[cell].random_place(&mut ctx.rng);
        sim.add_couple(Couple::new(couple.clone(), pos));
    }

    // ---------- run
    let mut observers = ObserversSet::new();
    observers.add_observer(Box::new(FiberLengthObserver::default()), 100);
    observers.add_observer(Box::new(AttachmentObserver::default()), 100);
    observers.add_observer(Box::new(BendingEnergyObserver::default()), 100);

    info!("cytomech: {} fibers, {} couples, {} steps", args.fibers, args.couples, args.steps);
    for _ in 0..args.steps {
        sim.step(&mut ctx)?;
        observers.observe(&sim);
    }
    observers.flush_observers();
    sim.relax();

    let counts = sim.couple_counts();
    println!("time {:.3} s", sim.time());
    println!("couples FF {}  AF {}  FA {}  AA {}", counts[0], counts[1], counts[2], counts[3]);
    println!("bending energy {:.4} pN.um", sim.bending_energy());
    if let Some(obs) = observers.get::<AttachmentObserver>("attachments") {
        if let Some((t, n)) = obs.samples.last() {
            println!("attached hands at t={:.2}: {}", t, n);
        }
    }
    Ok(())
}
