use clap::Parser;

use tracing::info;
use tracing_subscriber::EnvFilter;

use rrc_gc::{
    sim::{SimHost, SimRuntime},
    Collector, CollectorState, HostGc, HostRef, ObjectId, Options, OptionsBuilder, PassOutcome,
    TrackResult,
};

/// Raw command line arguments.
#[derive(Parser)]
#[command(about = "Drive the cycle collector over a simulated pair of heaps")]
pub struct Args {
    /// Number of foreign reference rings to allocate
    #[arg(long, default_value_t = 4)]
    pub rings: usize,

    /// Objects per ring
    #[arg(long, default_value_t = 3)]
    pub ring_size: usize,

    /// Link the first object of every ring to a host object
    #[arg(long, default_value_t = false)]
    pub bridged: bool,

    /// Number of bridged rings whose host object is a host root
    #[arg(long, default_value_t = 0)]
    pub rooted: usize,

    /// Number of rings held from outside both heaps
    #[arg(long, default_value_t = 0)]
    pub held: usize,

    /// Change a reference of the first ring after marking, before the verdict
    #[arg(long, default_value_t = false)]
    pub mutate: bool,

    /// Only sweep, never look for cycles
    #[arg(long, default_value_t = false)]
    pub disable_cycles: bool,

    /// Full marking scans per collector step. Unbounded if not set.
    #[arg(long)]
    pub scans_per_step: Option<usize>,

    /// Leave promoted host objects on the worklist until the step ends
    #[arg(long, default_value_t = false)]
    pub lazy_host_trace: bool,

    /// Number of host collections to run
    #[arg(long, default_value_t = 2)]
    pub rounds: usize,
}

/// Create collector options from command line arguments.
fn options_from_args(args: &Args) -> Options {
    OptionsBuilder::new()
        .cycle_enabled(!args.disable_cycles)
        .scans_per_step(args.scans_per_step)
        .eager_host_trace(!args.lazy_host_trace)
        .build()
}

pub fn print_error_message_and_exit(message: &str) -> ! {
    eprintln!("{message}");
    std::process::exit(1);
}

struct World {
    rt: SimRuntime,
    host: SimHost,
    rings: Vec<Vec<ObjectId>>,
}

fn build_world(args: &Args, collector: &mut Collector) -> TrackResult<World> {
    let mut rt = SimRuntime::new();
    let mut host = SimHost::new();
    let mut rings = Vec::with_capacity(args.rings);

    for i in 0..args.rings {
        let ring = rt.alloc_ring(args.ring_size);
        if args.bridged {
            let h: HostRef = host.alloc();
            rt.link(ring[0], h);
            if i < args.rooted {
                host.add_root(h);
            }
        }
        if i < args.held {
            rt.incref(ring[ring.len() - 1]);
        }

        for &obj in &ring {
            collector.track(obj)?;
        }
        rings.push(ring);
    }

    Ok(World { rt, host, rings })
}

/// Run one host collection, stepping the collector the way an incremental
/// host GC would.
fn run_round(args: &Args, collector: &mut Collector, world: &mut World, round: usize) -> usize {
    world.host.begin_collection();

    let mut steps = 0;
    loop {
        if round == 0
            && args.mutate
            && collector.state() == CollectorState::GarbageMarking
            && world.rings.len() > 1
        {
            let target = world.rings[1][0];
            let obj = world.rings[0][0];
            info!(object = %obj, target = %target, "changing reference before verdict");
            world.rt.retarget(obj, 0, target);
        }

        let finished = collector.trace_step(&mut world.rt, &mut world.host);
        steps += 1;
        world.host.drain();
        if finished {
            return steps;
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    if args.ring_size == 0 {
        print_error_message_and_exit("ring size must be at least 1");
    }

    let mut collector = Collector::new(options_from_args(&args));
    let mut world = match build_world(&args, &mut collector) {
        Ok(world) => world,
        Err(err) => print_error_message_and_exit(&err.to_string()),
    };

    for round in 0..args.rounds {
        let steps = run_round(&args, &mut collector, &mut world, round);
        let outcome = collector.last_outcome();
        info!(round, steps, ?outcome, "host collection finished");

        if let Some(PassOutcome::Collected { released, .. }) = outcome {
            println!("round {round}: {steps} steps, {released} objects released");
        } else {
            println!("round {round}: {steps} steps, {outcome:?}");
        }
    }

    let live = world.rt.live_objects().len();
    println!("{} of {} foreign objects alive", live, world.rt.object_count());
    println!("{:#?}", collector.stats());
}
