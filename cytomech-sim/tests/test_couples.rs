use cytomech_numerical::{SimRng, Vec3};
use cytomech_sim::{
    ConfineMode, ConfineProp, Couple, CoupleProp, CoupleState, Fiber, FiberProp, Hand, HandProp, HandRef,
    Properties, SimContext, Simul, SimulProp, SpaceSphere,
};
use std::sync::Arc;

fn static_world() -> SimulProp {
    SimulProp { kt: 0.0, ..Default::default() }
}

/// Two parallel fibers crosslinked by couples with a finite resting length
/// settle at a separation equal to that length.
#[test]
fn crosslinks_set_the_separation() {
    let mut sim = Simul::new(Properties::new(static_world())).unwrap();

    let mut hand = HandProp::new("passive");
    hand.binding_rate = 0.0;
    hand.unbinding_rate = 0.0;
    let hand = sim.properties.add_hand(hand).unwrap();

    let mut cp = CoupleProp::new("bridge", hand.clone(), hand.clone());
    cp.stiffness = 100.0;
    cp.length = 0.05;
    cp.diffusion = 0.0;
    let cp = sim.properties.add_couple(cp).unwrap();

    let mut fp = FiberProp::new("track");
    fp.segmentation = 0.25;
    fp.rigidity = 0.5;
    let fp = sim.properties.add_fiber(fp).unwrap();

    let f1 = sim.add_fiber(Fiber::new(fp.clone(), Vec3::new(-1.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0), 2.0));
    let f2 = sim.add_fiber(Fiber::new(fp, Vec3::new(-1.0, 0.1, 0.0), Vec3::new(1.0, 0.0, 0.0), 2.0));

    // 50 couples regularly spaced, bound on both fibers
    for k in 0..50 {
        let abs = 0.02 + 0.04 * k as f64;
        let id = sim.add_couple(Couple::new(cp.clone(), Vec3::zero()));
        sim.attach_couple_hand(id, 0, f1, abs).unwrap();
        sim.attach_couple_hand(id, 1, f2, abs).unwrap();
    }
    assert_eq!(sim.couple_counts()[3], 50);

    let mut ctx = SimContext::new(21);
    for _ in 0..400 {
        sim.step(&mut ctx).unwrap();
    }

    // mean separation measured at regular abscissas
    let fib1 = sim.fibers.get(f1).unwrap();
    let fib2 = sim.fibers.get(f2).unwrap();
    let mut mean = 0.0;
    let mut count = 0;
    for k in 0..20 {
        let abs = 0.1 + 0.09 * k as f64;
        mean += fib1.pos_at(abs).distance(&fib2.pos_at(abs));
        count += 1;
    }
    mean /= count as f64;
    assert!((mean - 0.05).abs() < 0.01, "separation {}", mean);
    // and every couple is still doubly bound
    assert_eq!(sim.couple_counts()[3], 50);
}

/// List membership matches hand state throughout stochastic turnover.
#[test]
fn list_discipline_under_turnover() {
    let mut sim = Simul::new(Properties::new(SimulProp::default())).unwrap();
    let cell = sim.add_space(Box::new(SpaceSphere::new(2.0)));

    let mut hand = HandProp::new("sticky");
    hand.binding_rate = 30.0;
    hand.binding_range = 0.1;
    hand.unbinding_rate = 3.0;
    let hand = sim.properties.add_hand(hand).unwrap();

    let mut cp = CoupleProp::new("linker", hand.clone(), hand.clone());
    cp.diffusion = 2.0;
    cp.confine = Some(ConfineProp { space: cell, mode: ConfineMode::Inside, stiffness: 100.0 });
    let cp = sim.properties.add_couple(cp).unwrap();

    let mut fp = FiberProp::new("track");
    fp.segmentation = 0.25;
    let fp = sim.properties.add_fiber(fp).unwrap();
    for k in 0..3 {
        let y = -0.5 + 0.5 * k as f64;
        sim.add_fiber(Fiber::new(fp.clone(), Vec3::new(-1.5, y, 0.0), Vec3::new(1.0, 0.0, 0.0), 3.0));
    }

    let mut ctx = SimContext::new(33);
    for _ in 0..100 {
        let pos = sim.spaces[cell].random_place(&mut ctx.rng);
        sim.add_couple(Couple::new(cp.clone(), pos));
    }

    for _ in 0..300 {
        sim.step(&mut ctx).unwrap();
        let counts = sim.couple_counts();
        assert_eq!(counts.iter().sum::<usize>(), 100);
    }
    // some turnover must actually have happened
    let counts = sim.couple_counts();
    assert!(counts[1] + counts[2] + counts[3] > 0, "no couple ever bound: {:?}", counts);
}

/// The fast-diffusion shortcut reproduces the attachment level of the
/// explicit simulation of free couples.
#[test]
fn fast_diffusion_matches_explicit() {
    let run = |fast: bool| -> f64 {
        let mut sim = Simul::new(Properties::new(static_world())).unwrap();
        let cell = sim.add_space(Box::new(SpaceSphere::new(2.0)));

        let mut hand = HandProp::new("grabby");
        hand.binding_rate = 50.0;
        hand.binding_range = 0.1;
        hand.unbinding_rate = 2.0;
        let hand = sim.properties.add_hand(hand).unwrap();

        let mut cp = CoupleProp::new("linker", hand.clone(), hand.clone());
        cp.diffusion = 3.0;
        cp.fast_diffusion = fast;
        cp.confine = Some(ConfineProp { space: cell, mode: ConfineMode::Inside, stiffness: 100.0 });
        let cp = sim.properties.add_couple(cp).unwrap();

        let mut fp = FiberProp::new("track");
        fp.segmentation = 0.5;
        let fp = sim.properties.add_fiber(fp).unwrap();
        for k in 0..3 {
            let y = -0.6 + 0.6 * k as f64;
            sim.add_fiber(Fiber::new(fp.clone(), Vec3::new(-1.5, y, 0.0), Vec3::new(1.0, 0.0, 0.0), 3.0));
        }

        let mut ctx = SimContext::new(55);
        for _ in 0..600 {
            let pos = sim.spaces[cell].random_place(&mut ctx.rng);
            sim.add_couple(Couple::new(cp.clone(), pos));
        }

        // settle, then average the attached population
        for _ in 0..500 {
            sim.step(&mut ctx).unwrap();
        }
        let mut sum = 0.0;
        let mut n = 0;
        for _ in 0..1000 {
            sim.step(&mut ctx).unwrap();
            sum += sim.count_attached() as f64;
            n += 1;
        }
        sim.relax();
        sum / n as f64
    };

    let explicit = run(false);
    let shortcut = run(true);
    assert!(explicit > 10.0, "explicit run bound too little: {}", explicit);
    let rel = (explicit - shortcut).abs() / explicit.max(shortcut);
    assert!(rel < 0.3, "attachment levels differ: {} vs {}", explicit, shortcut);
}

/// Mean survival of a bound hand matches the unbinding rate.
#[test]
fn kramers_mean_survival_time() {
    let mut prop = HandProp::new("loose");
    prop.unbinding_rate = 1.0;
    prop.unbinding_force = f64::INFINITY;
    prop.complete(&SimulProp { time_step: 1e-3, ..Default::default() }).unwrap();
    let prop = Arc::new(prop);

    let fib_prop = Arc::new(FiberProp::new("track"));
    let mut fib = Fiber::new(fib_prop, Vec3::zero(), Vec3::new(1.0, 0.0, 0.0), 10.0);

    let mut rng = SimRng::seeded(17);
    let dt = 1e-3;
    let replicates = 2000;
    let mut total = 0.0;
    for _ in 0..replicates {
        let mut hand = Hand::new(prop.clone());
        let me = HandRef::Single(0);
        hand.attach(&mut fib, 0, 5.0, me);
        let mut steps = 0u64;
        while hand.step_unloaded(&mut fib, me, dt, &mut rng) {
            steps += 1;
            if steps > 100_000 {
                panic!("hand never detached");
            }
        }
        total += (steps + 1) as f64 * dt;
    }
    let mean = total / replicates as f64;
    assert!((mean - 1.0).abs() < 0.12, "mean survival {}", mean);
}

/// A couple demanding antiparallel filaments refuses a parallel second bond.
#[test]
fn specificity_vetoes_second_bond() {
    let hand = Arc::new({
        let mut h = HandProp::new("h");
        h.complete(&SimulProp::default()).unwrap();
        h
    });
    let mut cp = CoupleProp::new("selective", hand.clone(), hand.clone());
    cp.specificity = cytomech_sim::CoupleSpecificity::Antiparallel;
    cp.complete(&SimulProp::default()).unwrap();
    let cp = Arc::new(cp);

    let fp = Arc::new(FiberProp::new("track"));
    let mut f1 = Fiber::new(fp.clone(), Vec3::new(-1.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0), 2.0);
    let f2 = Fiber::new(fp.clone(), Vec3::new(-1.0, 0.05, 0.0), Vec3::new(1.0, 0.0, 0.0), 2.0);
    let f3 = Fiber::new(fp, Vec3::new(1.0, -0.05, 0.0), Vec3::new(-1.0, 0.0, 0.0), 2.0);

    let mut c = Couple::new(cp, Vec3::zero());
    c.hand1.attach(&mut f1, 0, 1.0, HandRef::Couple(0, 0));
    assert_eq!(c.state(), CoupleState::AF);

    // same orientation: refused; opposite orientation: accepted
    assert!(!c.allow_second_bond(1, &f2, 1, 1.0, &f1));
    assert!(c.allow_second_bond(1, &f3, 2, 1.0, &f1));
}
