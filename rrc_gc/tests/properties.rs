//! Randomized whole-pass properties
//!
//! Random graphs spanning both heaps are collected, then compared with a
//! plain reachability walk over the combined graph.

use proptest::prelude::*;
use proptest::sample::Index;

use rrc_gc::sim::{SimHost, SimRuntime};
use rrc_gc::{Collector, CollectorState, HostGc, HostRef, ObjectId, OptionsBuilder, PassOutcome};

#[derive(Clone, Debug)]
struct Graph {
    foreign: usize,
    host: usize,
    /// Counted references between foreign objects
    edges: Vec<(usize, usize)>,
    /// Foreign objects held from outside both heaps
    held: Vec<usize>,
    /// (foreign, host) bridge links, first one wins for either side
    links: Vec<(usize, usize)>,
    host_edges: Vec<(usize, usize)>,
    host_roots: Vec<usize>,
}

fn graph() -> impl Strategy<Value = Graph> {
    (1usize..12, 1usize..6)
        .prop_flat_map(|(foreign, host)| {
            (
                Just(foreign),
                Just(host),
                prop::collection::vec((0..foreign, 0..foreign), 0..foreign * 2),
                prop::collection::vec(0..foreign, 0..3),
                prop::collection::vec((0..foreign, 0..host), 0..host + 1),
                prop::collection::vec((0..host, 0..host), 0..host * 2),
                prop::collection::vec(0..host, 0..2),
            )
        })
        .prop_map(
            |(foreign, host, edges, held, links, host_edges, host_roots)| Graph {
                foreign,
                host,
                edges,
                held,
                links,
                host_edges,
                host_roots,
            },
        )
}

struct World {
    rt: SimRuntime,
    host: SimHost,
    objs: Vec<ObjectId>,
    hosts: Vec<HostRef>,
    /// Host counterpart of each foreign object
    bridge_of: Vec<Option<usize>>,
    /// Foreign counterpart of each host object
    linked_to: Vec<Option<usize>>,
}

impl World {
    fn build(graph: &Graph) -> World {
        let mut rt = SimRuntime::new();
        let mut host = SimHost::new();
        let objs: Vec<ObjectId> = (0..graph.foreign).map(|_| rt.alloc()).collect();
        let hosts: Vec<HostRef> = (0..graph.host).map(|_| host.alloc()).collect();

        for &(from, to) in &graph.edges {
            rt.add_ref(objs[from], objs[to]);
        }
        for &obj in &graph.held {
            rt.incref(objs[obj]);
        }

        let mut bridge_of = vec![None; graph.foreign];
        let mut linked_to = vec![None; graph.host];
        for &(obj, h) in &graph.links {
            if bridge_of[obj].is_none() && linked_to[h].is_none() {
                bridge_of[obj] = Some(h);
                linked_to[h] = Some(obj);
                rt.link(objs[obj], hosts[h]);
            }
        }

        for &(from, to) in &graph.host_edges {
            host.add_edge(hosts[from], hosts[to]);
        }
        for &root in &graph.host_roots {
            host.add_root(hosts[root]);
        }

        World {
            rt,
            host,
            objs,
            hosts,
            bridge_of,
            linked_to,
        }
    }

    /// Reachability over both heaps. A bridge keeps both ends alive.
    fn expected_alive(&self, graph: &Graph) -> (Vec<bool>, Vec<bool>) {
        enum Node {
            Foreign(usize),
            Host(usize),
        }

        let mut foreign_alive = vec![false; graph.foreign];
        let mut host_alive = vec![false; graph.host];
        let mut pending: Vec<Node> = graph
            .held
            .iter()
            .map(|&obj| Node::Foreign(obj))
            .chain(graph.host_roots.iter().map(|&h| Node::Host(h)))
            .collect();

        while let Some(node) = pending.pop() {
            match node {
                Node::Foreign(obj) => {
                    if foreign_alive[obj] {
                        continue;
                    }
                    foreign_alive[obj] = true;
                    for &(from, to) in &graph.edges {
                        if from == obj {
                            pending.push(Node::Foreign(to));
                        }
                    }
                    if let Some(h) = self.bridge_of[obj] {
                        pending.push(Node::Host(h));
                    }
                }
                Node::Host(h) => {
                    if host_alive[h] {
                        continue;
                    }
                    host_alive[h] = true;
                    for &(from, to) in &graph.host_edges {
                        if from == h {
                            pending.push(Node::Host(to));
                        }
                    }
                    if let Some(obj) = self.linked_to[h] {
                        pending.push(Node::Foreign(obj));
                    }
                }
            }
        }

        (foreign_alive, host_alive)
    }

    fn tracking_collector(&self, options: rrc_gc::Options) -> Collector {
        let mut collector = Collector::new(options);
        for &obj in &self.objs {
            collector.track(obj).unwrap();
        }
        collector
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn prop_released_exactly_unreachable(
        graph in graph(),
        scans_per_step in prop::option::of(1usize..3),
        eager_host_trace in any::<bool>(),
    ) {
        let mut world = World::build(&graph);
        let (foreign_alive, host_alive) = world.expected_alive(&graph);

        let options = OptionsBuilder::new()
            .scans_per_step(scans_per_step)
            .eager_host_trace(eager_host_trace)
            .build();
        let mut collector = world.tracking_collector(options);

        world.host.begin_collection();
        collector.collect(&mut world.rt, &mut world.host);

        for (i, &obj) in world.objs.iter().enumerate() {
            prop_assert_eq!(world.rt.is_released(obj), !foreign_alive[i], "foreign object {}", i);
            prop_assert_eq!(collector.is_tracked(obj), foreign_alive[i], "foreign object {}", i);
        }
        for (i, &h) in world.hosts.iter().enumerate() {
            prop_assert_eq!(world.host.is_visited(h), host_alive[i], "host object {}", i);
        }
        prop_assert!(collector.stats().snapshots_balanced());
        prop_assert!(collector.snapshot().is_none());
    }

    #[test]
    fn prop_mutating_dead_object_resurrects_pass(
        graph in graph(),
        kind in 0u8..4,
        victim in any::<Index>(),
        other in any::<Index>(),
    ) {
        let mut world = World::build(&graph);
        let mut collector = world.tracking_collector(OptionsBuilder::new().build());

        world.host.begin_collection();
        while collector.state() != CollectorState::GarbageMarking {
            collector.trace_step(&mut world.rt, &mut world.host);
            world.host.drain();
        }

        let dead: Vec<(ObjectId, Option<HostRef>)> = collector
            .snapshot()
            .unwrap()
            .records()
            .iter()
            .filter(|record| record.is_dead())
            .map(|record| (record.object, record.bridge))
            .collect();
        prop_assume!(!dead.is_empty());

        let (victim, bridge) = dead[victim.index(dead.len())];
        let other = world.objs[other.index(world.objs.len())];
        let first_ref = world.rt.refs(victim).first().copied();
        match (kind, first_ref, bridge) {
            // Drop an outgoing reference
            (0, Some(target), _) => {
                world.rt.remove_ref(victim, target);
            }
            // New incoming reference
            (1, _, _) => world.rt.add_ref(other, victim),
            // The host program stores the bridged host object somewhere
            // already marked; no foreign refcount changes
            (2, _, Some(bridge)) => {
                world.host.write_barrier(bridge);
                world.host.drain();
            }
            // New outgoing reference
            _ => world.rt.add_ref(victim, other),
        }

        prop_assert!(collector.trace_step(&mut world.rt, &mut world.host));
        prop_assert_eq!(collector.last_outcome(), Some(PassOutcome::Resurrected));
        prop_assert!(world.rt.released().is_empty());
    }
}
