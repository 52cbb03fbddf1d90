use cytomech_numerical::Vec3;
use cytomech_sim::{
    Anchor, AnchorObject, Fiber, FiberProp, HandActivity, HandProp, Mecable, Properties, SimContext, Simul,
    SimulProp, Single, SingleProp, Solid, Sphere,
};

fn quiet() -> SimulProp {
    SimulProp { kt: 0.0, ..Default::default() }
}

/// A stiff picket pulls the attachment point of the fiber onto its base.
#[test]
fn picket_holds_the_fiber() {
    let mut sim = Simul::new(Properties::new(quiet())).unwrap();

    let mut hp = HandProp::new("anchor");
    hp.binding_rate = 0.0;
    hp.unbinding_rate = 0.0;
    let hp = sim.properties.add_hand(hp).unwrap();
    let mut sp = SingleProp::new("picket", hp);
    sp.stiffness = 500.0;
    let sp = sim.properties.add_single(sp).unwrap();

    let mut fp = FiberProp::new("track");
    fp.segmentation = 0.25;
    fp.rigidity = 0.1;
    let fp = sim.properties.add_fiber(fp).unwrap();
    let fid = sim.add_fiber(Fiber::new(fp, Vec3::new(-1.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0), 2.0));

    let base = Vec3::new(0.1, 0.3, 0.0);
    let sid = sim.add_single(Single::picket(sp, base));
    sim.attach_single_hand(sid, fid, 1.0).unwrap();

    let mut ctx = SimContext::new(81);
    for _ in 0..600 {
        sim.step(&mut ctx).unwrap();
    }
    let fib = sim.fibers.get(fid).unwrap();
    let hand_pos = sim.singles[sid].hand.pos(fib);
    assert!(hand_pos.distance(&base) < 0.02, "hand at {:?}", hand_pos);
}

/// A wrist on a solid couples the fiber to the rigid body: the link closes
/// by moving both objects.
#[test]
fn wrist_links_fiber_and_solid() {
    let mut sim = Simul::new(Properties::new(quiet())).unwrap();

    let mut hp = HandProp::new("anchor");
    hp.binding_rate = 0.0;
    hp.unbinding_rate = 0.0;
    let hp = sim.properties.add_hand(hp).unwrap();
    let mut sp = SingleProp::new("wrist", hp);
    sp.stiffness = 200.0;
    sp.anchor = cytomech_sim::properties::SingleAnchor::Wrist;
    let sp = sim.properties.add_single(sp).unwrap();

    let mut fp = FiberProp::new("track");
    fp.segmentation = 0.25;
    fp.rigidity = 0.5;
    let fp = sim.properties.add_fiber(fp).unwrap();
    let fid = sim.add_fiber(Fiber::new(fp, Vec3::new(-1.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0), 2.0));

    let solid = Solid::new(&[
        (Vec3::new(0.0, 0.5, 0.0), 0.1),
        (Vec3::new(0.2, 0.5, 0.0), 0.1),
        (Vec3::new(0.0, 0.7, 0.0), 0.1),
    ]);
    let sol_id = sim.add_solid(solid);

    let sid = sim.add_single(Single::wrist(
        sp,
        Anchor { object: AnchorObject::Solid(sol_id), point: 0 },
    ));
    sim.attach_single_hand(sid, fid, 1.0).unwrap();

    let before = sim.solids[sol_id].point(0).distance(&Vec3::new(0.0, 0.0, 0.0));
    let mut ctx = SimContext::new(82);
    for _ in 0..800 {
        sim.step(&mut ctx).unwrap();
    }

    let fib = sim.fibers.get(fid).unwrap();
    let hand_pos = sim.singles[sid].hand.pos(fib);
    let anchor_pos = sim.solids[sol_id].point(0);
    assert!(hand_pos.distance(&anchor_pos) < 0.05, "link still open: {:?} vs {:?}", hand_pos, anchor_pos);
    assert!(anchor_pos.norm() < before, "solid did not move");

    // the solid kept its shape through the motion
    let d01 = sim.solids[sol_id].point(0).distance(&sim.solids[sol_id].point(1));
    assert!((d01 - 0.2).abs() < 1e-3, "solid deformed: {}", d01);
}

/// An anchored motor makes a free fiber glide: the hand walks towards the
/// plus end while the fiber is carried backwards.
#[test]
fn anchored_motor_glides_the_fiber() {
    let mut sim = Simul::new(Properties::new(quiet())).unwrap();

    let mut hp = HandProp::new("walker");
    hp.binding_rate = 0.0;
    hp.unbinding_rate = 0.0;
    hp.hold_fiber_end = true;
    hp.activity = HandActivity::Move { unloaded_speed: 0.5, stall_force: 5.0 };
    let hp = sim.properties.add_hand(hp).unwrap();
    let mut sp = SingleProp::new("motor", hp);
    sp.stiffness = 100.0;
    let sp = sim.properties.add_single(sp).unwrap();

    let mut fp = FiberProp::new("cargo");
    fp.segmentation = 0.25;
    fp.rigidity = 0.5;
    let fp = sim.properties.add_fiber(fp).unwrap();
    let fid = sim.add_fiber(Fiber::new(fp, Vec3::new(-1.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0), 2.0));

    let sid = sim.add_single(Single::picket(sp, Vec3::new(0.0, 0.02, 0.0)));
    sim.attach_single_hand(sid, fid, 0.5).unwrap();

    let abs0 = sim.singles[sid].hand.abscissa();
    let centroid0 = sim.fibers.get(fid).unwrap().centroid();

    let mut ctx = SimContext::new(83);
    for _ in 0..1000 {
        sim.step(&mut ctx).unwrap();
    }

    let abs1 = sim.singles[sid].hand.abscissa();
    let centroid1 = sim.fibers.get(fid).unwrap().centroid();
    assert!(abs1 > abs0 + 0.2, "motor did not walk: {} -> {}", abs0, abs1);
    // the fiber glides opposite to the walking direction
    assert!(centroid1.x < centroid0.x - 0.1, "fiber did not glide: {:?}", centroid1);
}

/// Surface points of a sphere can anchor a wrist; they stay on the shell
/// while the sphere is dragged around.
#[test]
fn sphere_surface_anchor() {
    let mut sim = Simul::new(Properties::new(quiet())).unwrap();

    let mut hp = HandProp::new("anchor");
    hp.binding_rate = 0.0;
    hp.unbinding_rate = 0.0;
    let hp = sim.properties.add_hand(hp).unwrap();
    let mut sp = SingleProp::new("wrist", hp);
    sp.stiffness = 200.0;
    sp.anchor = cytomech_sim::properties::SingleAnchor::Wrist;
    let sp = sim.properties.add_single(sp).unwrap();

    let mut fp = FiberProp::new("track");
    fp.segmentation = 0.25;
    fp.rigidity = 0.5;
    let fp = sim.properties.add_fiber(fp).unwrap();
    let fid = sim.add_fiber(Fiber::new(fp, Vec3::new(-1.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0), 2.0));

    let mut sphere = Sphere::new(Vec3::new(0.0, 0.8, 0.0), 0.3);
    let anchor_point = sphere.add_surface_point(Vec3::new(0.0, -1.0, 0.0));
    let sph_id = sim.add_sphere(sphere);

    let sid = sim.add_single(Single::wrist(
        sp,
        Anchor { object: AnchorObject::Sphere(sph_id), point: anchor_point },
    ));
    sim.attach_single_hand(sid, fid, 1.0).unwrap();

    let mut ctx = SimContext::new(84);
    for _ in 0..800 {
        sim.step(&mut ctx).unwrap();
    }

    let sph = &sim.spheres[sph_id];
    // the anchor stayed on the shell
    let r = sph.point(anchor_point).distance(&sph.center());
    assert!((r - 0.3).abs() < 1e-9, "anchor left the shell: {}", r);
    // and the sphere was pulled towards the fiber
    assert!(sph.center().y < 0.8, "sphere did not move");
}
