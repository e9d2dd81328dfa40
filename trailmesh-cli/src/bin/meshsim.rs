//! meshsim - Simulate a trailmesh deployment in memory
//!
//! Wires N nodes into a chain topology with the gateway at one end, lets
//! beacons populate the routing tables, then pushes a motion alert and an
//! image from the far end of the chain and reports what the gateway saw.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::process;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use trailmesh_cli::args::Args;
use trailmesh_cli::format::{path_str, size_str};
use trailmesh_core::frame::{Frame, MessageType};
use trailmesh_core::payload::MotionAlertPayload;
use trailmesh_core::routing::RouteEntry;
use trailmesh_core::types::{LinkAddress, NodeId, Role};
use trailmesh_net::{Callbacks, Clock, MeshConfig, MeshNode, Radio, RadioError};

const VERSION: &str = env!("CARGO_PKG_VERSION");

// =============================================================================
// In-memory radio and clock
// =============================================================================

type Outbox = Rc<RefCell<VecDeque<(LinkAddress, Vec<u8>)>>>;

struct SimRadio {
    addr: LinkAddress,
    outbox: Outbox,
    pending: Option<bool>,
}

impl Radio for SimRadio {
    fn start_send(&mut self, addr: &LinkAddress, bytes: &[u8]) -> Result<(), RadioError> {
        self.outbox.borrow_mut().push_back((*addr, bytes.to_vec()));
        self.pending = Some(true);
        Ok(())
    }

    fn poll_send_complete(&mut self) -> Option<bool> {
        self.pending.take()
    }

    fn local_address(&self) -> LinkAddress {
        self.addr
    }
}

struct SimClock {
    now: Rc<Cell<u64>>,
}

impl Clock for SimClock {
    fn now_ms(&mut self) -> u64 {
        self.now.get()
    }

    fn yield_ms(&mut self, ms: u64) {
        self.now.set(self.now.get() + ms);
    }
}

#[derive(Default)]
struct GatewayLog {
    alerts: Vec<MotionAlertPayload>,
    images: Vec<(NodeId, u16, Vec<u8>)>,
    failures: Vec<(NodeId, u16, u16, u16)>,
}

struct GatewayUplink(Arc<Mutex<GatewayLog>>);

impl Callbacks for GatewayUplink {
    fn on_message(&mut self, frame: &Frame) {
        if frame.message_type() == Some(MessageType::MotionAlert) {
            if let Ok(alert) = MotionAlertPayload::unpack(&frame.payload) {
                self.0.lock().unwrap().alerts.push(alert);
            }
        }
    }

    fn on_image_received(&mut self, source: NodeId, image_id: u16, data: &[u8]) {
        self.0
            .lock()
            .unwrap()
            .images
            .push((source, image_id, data.to_vec()));
    }

    fn on_image_failed(&mut self, source: NodeId, image_id: u16, received: u16, expected: u16) {
        self.0
            .lock()
            .unwrap()
            .failures
            .push((source, image_id, received, expected));
    }
}

// =============================================================================
// Simulation
// =============================================================================

struct Sim {
    nodes: Vec<MeshNode<SimRadio, SimClock>>,
    outboxes: Vec<Outbox>,
    addrs: Vec<LinkAddress>,
    clock: Rc<Cell<u64>>,
}

impl Sim {
    /// Chain topology: node 0 is the gateway, node i hears only i-1 and i+1.
    fn build(node_count: usize) -> Sim {
        let clock = Rc::new(Cell::new(0u64));
        let mut sim = Sim {
            nodes: Vec::new(),
            outboxes: Vec::new(),
            addrs: Vec::new(),
            clock,
        };
        for i in 0..node_count {
            let id = (i + 1) as u16;
            let role = if i == 0 { Role::Gateway } else { Role::Sensor };
            let addr = LinkAddress([id as u8; 6]);
            let outbox: Outbox = Rc::new(RefCell::new(VecDeque::new()));
            let radio = SimRadio {
                addr,
                outbox: Rc::clone(&outbox),
                pending: None,
            };
            let node_clock = SimClock {
                now: Rc::clone(&sim.clock),
            };
            let node = match MeshNode::new(NodeId(id), role, MeshConfig::default(), radio, node_clock)
            {
                Ok(node) => node,
                Err(e) => {
                    eprintln!("Node {} init failed: {}", id, e);
                    process::exit(1);
                }
            };
            sim.nodes.push(node);
            sim.outboxes.push(outbox);
            sim.addrs.push(addr);
        }
        sim
    }

    /// Deliver queued frames along the chain until the air goes quiet.
    fn pump(&mut self) {
        for _ in 0..1000 {
            let mut deliveries = Vec::new();
            for (sender, outbox) in self.outboxes.iter().enumerate() {
                while let Some((target, bytes)) = outbox.borrow_mut().pop_front() {
                    deliveries.push((sender, target, bytes));
                }
            }
            if deliveries.is_empty() {
                return;
            }
            for (sender, target, bytes) in deliveries {
                for receiver in 0..self.nodes.len() {
                    let adjacent = receiver.abs_diff(sender) == 1;
                    if !adjacent {
                        continue;
                    }
                    if target.is_broadcast() || target == self.addrs[receiver] {
                        let from = self.addrs[sender];
                        self.nodes[receiver].ingest(from, &bytes);
                    }
                }
            }
        }
        eprintln!("Simulation did not settle; aborting");
        process::exit(1);
    }

    fn advance_and_tick(&mut self, ms: u64) {
        self.clock.set(self.clock.get() + ms);
        for node in self.nodes.iter_mut() {
            node.tick();
        }
        self.pump();
    }
}

fn print_routes(label: &str, routes: &[RouteEntry]) {
    println!("  {}:", label);
    if routes.is_empty() {
        println!("    (no peers)");
        return;
    }
    for entry in routes {
        println!(
            "    node {:<9} hops-to-gw {:<3} rssi {:<4} gateway {}",
            entry.node_id.to_string(),
            if entry.hop_count == 0xFF {
                "?".to_string()
            } else {
                entry.hop_count.to_string()
            },
            entry.rssi,
            entry.is_gateway
        );
    }
}

fn print_usage() {
    println!("meshsim {}", VERSION);
    println!();
    println!("Usage: meshsim [options]");
    println!();
    println!("Options:");
    println!("  --nodes <n>        Chain length including the gateway (2-16, default 4)");
    println!("  --image-bytes <n>  Image size to transfer (default 2400, max 28500)");
    println!("  -v / -vv / -vvv    Log verbosity");
    println!("  --version          Print version");
    println!("  --help             This text");
}

fn main() {
    let args = Args::parse();

    if args.has("version") {
        println!("meshsim {}", VERSION);
        return;
    }
    if args.has("help") {
        print_usage();
        return;
    }

    env_logger::Builder::new()
        .filter_level(match args.verbosity {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        })
        .format_timestamp(None)
        .init();

    let node_count = args.get_usize("nodes", 4).clamp(2, 16);
    let image_bytes = args.get_usize("image-bytes", 2400).min(28_500);

    println!("Simulating a {}-node chain (gateway at node 1)", node_count);
    println!();

    let gateway_log = Arc::new(Mutex::new(GatewayLog::default()));
    let mut sim = Sim::build(node_count);
    sim.nodes[0].set_callbacks(Box::new(GatewayUplink(Arc::clone(&gateway_log))));

    // Initial beacons, plus one full heartbeat cycle so hop counts settle.
    sim.pump();
    sim.advance_and_tick(10_000);

    println!("Routing tables after beacon exchange:");
    for i in 0..sim.nodes.len() {
        let label = format!("node {} ({})", sim.nodes[i].node_id(), sim.nodes[i].role());
        print_routes(&label, &sim.nodes[i].snapshot_nodes());
    }
    println!();

    // Motion at the far end of the chain.
    let far = sim.nodes.len() - 1;
    let timestamp = sim.clock.get() as u32;
    if let Err(e) = sim.nodes[far].send_motion_alert(timestamp, 1, true) {
        eprintln!("Motion alert failed: {}", e);
        process::exit(1);
    }
    sim.pump();

    let log = gateway_log.lock().unwrap();
    match log.alerts.first() {
        Some(alert) => {
            println!("Motion alert delivered; path {}", path_str(&alert.path));
        }
        None => {
            eprintln!("Motion alert never reached the gateway");
            process::exit(1);
        }
    }
    drop(log);

    // Image from the same node.
    let image: Vec<u8> = (0..image_bytes).map(|i| (i * 37 + 13) as u8).collect();
    if let Err(e) = sim.nodes[far].send_image(&image, 1) {
        eprintln!("Image transfer failed: {}", e);
        process::exit(1);
    }
    sim.pump();

    let log = gateway_log.lock().unwrap();
    match log.images.first() {
        Some((source, image_id, data)) if *data == image => {
            println!(
                "Image {} from node {} reassembled intact ({})",
                image_id,
                source,
                size_str(data.len() as u64)
            );
        }
        Some((source, image_id, data)) => {
            eprintln!(
                "Image {} from node {} corrupt: {} of {}",
                image_id,
                source,
                size_str(data.len() as u64),
                size_str(image.len() as u64)
            );
            process::exit(1);
        }
        None => {
            eprintln!(
                "Image never completed at the gateway ({} partial transfers)",
                log.failures.len()
            );
            process::exit(1);
        }
    }
    drop(log);

    println!();
    println!("Per-node statistics:");
    for node in sim.nodes.iter() {
        let stats = node.stats();
        println!(
            "  node {:<3} sent {:<5} received {:<5} relayed {:<5} delivered {:<5} dup-dropped {}",
            node.node_id().to_string(),
            stats.messages_sent,
            stats.messages_received,
            stats.messages_relayed,
            stats.messages_delivered,
            stats.duplicates_dropped
        );
    }
}
