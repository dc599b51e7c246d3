//! Server tick scheduler: a single physics thread driving fixed-rate
//! simulation and a slower net broadcast cadence, fed by a tokio-driven QUIC
//! accept loop. A busy-timer accumulator drives both cadences off one
//! physics thread, handing broadcast encoding off to the registry,
//! replica-cache, and transport components in `physx_core`.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use glam::Vec3;
use parking_lot::{Mutex, RwLock};

use physx_core::wire::{encode_header, CompressionProfile, Framer, Writer};
use physx_core::{
    Actor, Connection, ConnectionState, Entity, Listener, ObjectCategory, PhysicsSync,
    PlayerConfig, PlayerController, PlayerInput, PlayerState, Registry,
};

use crate::config::ServerConfig;
use crate::events::{DisconnectReason, ServerEvent};
use crate::scene::{SceneSeed, SceneSource, ShapeDesc, ShapeTable};

/// Physics world, registry, and shape metadata behind one RW lock: the tick
/// thread writes during simulate/gc and reads during net encode; the accept
/// loop takes a brief write lock only to spawn/seed. Never held across an
/// `.await` point.
struct Scene {
    physics: physx_core::PhysicsWorld,
    registry: Registry,
    shapes: ShapeTable,
}

struct ConnectionHandle {
    pid: u32,
    addr: SocketAddr,
    conn: Connection,
    object_id: u16,
    entity: Mutex<Entity>,
    input: Mutex<PlayerInput>,
    player_state: Mutex<PlayerState>,
    replica: Mutex<physx_core::ReplicaCache>,
    last_ground_tick: AtomicU64,
}

/// Server-side handle: owns the listener, the scene, and the connection
/// table. `run` drives the accept loop (tokio) and the tick loop (a plain
/// thread) to completion.
pub struct GameServer {
    config: ServerConfig,
    controller: PlayerController,
    listener: Listener,
    scene: Arc<RwLock<Scene>>,
    connections: Arc<Mutex<HashMap<u32, Arc<ConnectionHandle>>>>,
    next_pid: AtomicU32,
    tick: Arc<AtomicU64>,
    events: Arc<Mutex<VecDeque<ServerEvent>>>,
    running: Arc<AtomicBool>,
    start_time: Instant,
}

/// Snapshot of server state for the TUI/headless status line.
#[derive(Debug, Clone)]
pub struct ServerStats {
    pub tick: u64,
    pub client_count: usize,
    pub max_clients: usize,
    pub object_count: usize,
    pub bind_addr: SocketAddr,
    pub uptime_secs: u64,
}

impl GameServer {
    pub fn new(config: ServerConfig, seed: &dyn SceneSeed) -> Result<Self, physx_core::TransportError> {
        let listener = Listener::bind(
            &config.bind_addr,
            config.cert_path.as_deref(),
            config.key_path.as_deref(),
        )?;

        let mut physics = physx_core::PhysicsWorld::new();
        let mut registry = Registry::new();
        let mut shapes = ShapeTable::default();
        seed.seed(&mut physics, &mut registry, &mut shapes);

        Ok(Self {
            config,
            controller: PlayerController::new(PlayerConfig::default()),
            listener,
            scene: Arc::new(RwLock::new(Scene { physics, registry, shapes })),
            connections: Arc::new(Mutex::new(HashMap::new())),
            next_pid: AtomicU32::new(1),
            tick: Arc::new(AtomicU64::new(0)),
            events: Arc::new(Mutex::new(VecDeque::new())),
            running: Arc::new(AtomicBool::new(true)),
            start_time: Instant::now(),
        })
    }

    pub fn stats(&self) -> ServerStats {
        ServerStats {
            tick: self.tick.load(Ordering::Relaxed),
            client_count: self.connections.lock().len(),
            max_clients: self.config.max_clients,
            object_count: self.scene.read().registry.len(),
            bind_addr: self.local_addr(),
            uptime_secs: self.start_time.elapsed().as_secs(),
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.listener.local_addr().unwrap_or_else(|_| "0.0.0.0:0".parse().unwrap())
    }

    pub fn running(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn drain_events(&self) -> Vec<ServerEvent> {
        self.events.lock().drain(..).collect()
    }

    pub fn tick_count(&self) -> u64 {
        self.tick.load(Ordering::Relaxed)
    }

    pub fn client_count(&self) -> usize {
        self.connections.lock().len()
    }

    /// Runs the accept loop on the current tokio runtime and the tick loop on
    /// a dedicated OS thread, returning once both have stopped.
    pub async fn run(self: Arc<Self>) {
        let tick_handle = {
            let server = Arc::clone(&self);
            std::thread::spawn(move || server.tick_loop())
        };

        self.accept_loop().await;
        let _ = tick_handle.join();
    }

    pub fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    async fn accept_loop(&self) {
        while self.running.load(Ordering::SeqCst) {
            let conn = match self.listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    self.events.lock().push_back(ServerEvent::Error {
                        message: format!("accept failed: {e}"),
                    });
                    continue;
                }
            };

            let addr = conn.remote_addr();
            self.events
                .lock()
                .push_back(ServerEvent::ClientConnecting { addr });

            if self.connections.lock().len() >= self.config.max_clients {
                conn.disconnect();
                self.events.lock().push_back(ServerEvent::ConnectionDenied {
                    addr,
                    reason: "server full".into(),
                });
                continue;
            }

            let handle = self.spawn_connection(conn, addr);
            self.events.lock().push_back(ServerEvent::ClientConnected {
                pid: handle.pid,
                addr,
                player_object_id: handle.object_id,
            });

            self.connections.lock().insert(handle.pid, Arc::clone(&handle));
            self.spawn_reader(handle);
        }
    }

    fn spawn_connection(&self, conn: Connection, addr: SocketAddr) -> Arc<ConnectionHandle> {
        let pid = self.next_pid.fetch_add(1, Ordering::Relaxed);
        let spawn_pos = Vec3::new(0.0, 2.0, 0.0);

        let handle = {
            let mut scene = self.scene.write();
            let radius = scene_player_radius(&self.controller);
            let height = scene_player_height(&self.controller);
            let body = scene.physics.add_player(spawn_pos, radius, height);
            let id = scene
                .registry
                .add(Actor::Body(body), ObjectCategory::Player)
                .expect("16-bit object id pool exhausted");
            scene.shapes.insert(
                id,
                ShapeDesc::PlayerCapsule { half_height: height / 2.0, radius },
                true,
            );

            let mut entity = Entity::player(pid, spawn_pos);
            entity.physics_handle = Some(body);

            Arc::new(ConnectionHandle {
                pid,
                addr,
                conn,
                object_id: id,
                entity: Mutex::new(entity),
                input: Mutex::new(PlayerInput::default()),
                player_state: Mutex::new(PlayerState::new()),
                replica: Mutex::new(physx_core::ReplicaCache::new()),
                last_ground_tick: AtomicU64::new(0),
            })
        };

        handle
    }

    fn spawn_reader(&self, handle: Arc<ConnectionHandle>) {
        let connections = Arc::clone(&self.connections);
        let events = Arc::clone(&self.events);
        let scene = Arc::clone(&self.scene);

        tokio::spawn(async move {
            let mut framer = Framer::new(physx_core::MAX_RECV, physx_core::MAX_DECOMP);
            let mut buf = [0u8; 4096];

            loop {
                let n = match handle.conn.recv(&mut buf).await {
                    Ok(0) => break,
                    Ok(n) => n,
                    Err(_) => break,
                };

                let input_slot = &handle.input;
                let decode_result = framer.feed(&buf[..n], |payload| {
                    let reader = physx_core::Reader::new(payload);
                    let input = PlayerInput::decode(&reader);
                    if !reader.has_error() {
                        *input_slot.lock() = input;
                    }
                });

                if decode_result.is_err() || handle.conn.state() == ConnectionState::Closed {
                    break;
                }
            }

            disconnect(&connections, &scene, &events, handle.pid, DisconnectReason::Graceful);
        });
    }

    fn tick_loop(&self) {
        let tick_interval = self.config.tick_interval();
        let net_interval = self.config.net_interval();
        let dt = tick_interval.as_secs_f32();

        let mut last_net = Instant::now();

        while self.running.load(Ordering::SeqCst) {
            let tick_start = Instant::now();

            let conns: Vec<Arc<ConnectionHandle>> =
                self.connections.lock().values().cloned().collect();

            for handle in &conns {
                self.step_player(handle, dt);
            }
            self.scene.write().physics.step();

            self.tick.fetch_add(1, Ordering::Relaxed);

            let now = Instant::now();
            if now >= last_net + net_interval {
                last_net += net_interval;
                self.broadcast(&conns);
            }

            {
                let mut guard = self.scene.write();
                let Scene { physics, registry, .. } = &mut *guard;
                registry.gc(|obj| match obj.actor {
                    Actor::Body(h) => physics.remove_body(h),
                    Actor::Collider(h) => physics.remove_collider(h),
                });
            }

            let busy = tick_start.elapsed();
            let sleep_for = tick_interval
                .checked_sub(busy)
                .unwrap_or(Duration::from_millis(1))
                .max(Duration::from_millis(1));
            std::thread::sleep(sleep_for);
        }
    }

    /// Per-connection locks are taken and released before the scene lock, per
    /// the input -> handle -> player -> object -> scene order: the scene RW
    /// lock is the innermost, acquired last.
    fn step_player(&self, handle: &ConnectionHandle, dt: f32) {
        let input = *handle.input.lock();
        let mut state = handle.player_state.lock();
        let mut entity = handle.entity.lock();

        let mut scene = self.scene.write();
        self.controller.process(&input, &mut entity, &mut scene.physics, &mut state, dt);
        PhysicsSync::physics_to_entity(&mut entity, &scene.physics);

        if state.grounded {
            handle.last_ground_tick.store(self.tick.load(Ordering::Relaxed), Ordering::Relaxed);
        }

        let Some(body) = entity.physics_handle else { return };
        let new_pos = entity.position + entity.velocity * dt;
        entity.position = new_pos;
        scene.physics.set_next_kinematic_pose(body, new_pos, entity.orientation);
    }

    /// Per-connection state (`write_player_state`'s player/object locks) is
    /// read before the scene lock is taken for the replica diff, matching
    /// `step_player`'s input -> handle -> player -> object -> scene order.
    fn broadcast(&self, conns: &[Arc<ConnectionHandle>]) {
        let timestamp_ms = wall_clock_ms();

        for recipient in conns {
            let mut w = Writer::new();
            w.write_u8(physx_core::PROTOCOL_VERSION.0);
            w.write_u8(physx_core::PROTOCOL_VERSION.1);
            w.write_u8(physx_core::PROTOCOL_VERSION.2);
            w.write_i64(timestamp_ms);

            w.write_u32(conns.len() as u32);
            write_player_state(&mut w, recipient);
            for other in conns {
                if other.pid == recipient.pid {
                    continue;
                }
                write_player_state(&mut w, other);
            }

            let mut cache = recipient.replica.lock();
            let scene = self.scene.read();
            let source = SceneSource {
                physics: &scene.physics,
                registry: &scene.registry,
                shapes: &scene.shapes,
            };
            let live_ids = scene.registry.objects().map(|o| o.id);
            w.write_u32(cache.len() as u32);
            let (_, after) = cache.diff(scene.registry.presence(), live_ids, &source, &mut w);
            w.write_u32(after);
            drop(cache);
            drop(scene);

            let payload = w.finalize();
            let framed = frame(payload);
            let conn = recipient.conn.clone();
            tokio::spawn(async move {
                let _ = conn.send(framed).await;
            });
        }
    }
}

fn write_player_state(w: &mut Writer, handle: &ConnectionHandle) {
    let entity = handle.entity.lock();
    let state = handle.player_state.lock();
    w.write_u32(handle.pid);
    w.write_u8(u8::from(state.grounded));
    w.write_u32(handle.last_ground_tick.load(Ordering::Relaxed).min(u32::MAX as u64) as u32);
    w.write_f32(entity.position.x);
    w.write_f32(entity.position.y);
    w.write_f32(entity.position.z);
    w.write_f32(entity.velocity.x);
    w.write_f32(entity.velocity.y);
    w.write_f32(entity.velocity.z);
}

fn frame(payload: Vec<u8>) -> bytes::Bytes {
    let header = encode_header(payload.len(), CompressionProfile::None);
    let mut framed = Vec::with_capacity(header.len() + payload.len());
    framed.extend_from_slice(&header);
    framed.extend_from_slice(&payload);
    bytes::Bytes::from(framed)
}

fn wall_clock_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn scene_player_radius(controller: &PlayerController) -> f32 {
    controller.config().player_radius
}

fn scene_player_height(controller: &PlayerController) -> f32 {
    controller.config().player_height
}

fn disconnect(
    connections: &Arc<Mutex<HashMap<u32, Arc<ConnectionHandle>>>>,
    scene: &Arc<RwLock<Scene>>,
    events: &Arc<Mutex<VecDeque<ServerEvent>>>,
    pid: u32,
    reason: DisconnectReason,
) {
    let Some(handle) = connections.lock().remove(&pid) else {
        return;
    };
    handle.conn.disconnect();
    scene.read().registry.release(handle.object_id);
    events
        .lock()
        .push_back(ServerEvent::ClientDisconnected { pid, reason });
}
