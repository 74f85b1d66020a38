//! End-to-end scenarios against a real [`Engine`], a real [`WorkerPool`],
//! and the crate's own fakes standing in for state-machine bodies and
//! external APIs — the six scenarios and several of the invariants
//! described alongside the dispatch engine's design.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Map, Value};

use routerd::config::Config;
use routerd::debug_store::{DebugStore, InMemoryDebugStore};
use routerd::engine::Engine;
use routerd::event::{Event, Kind};
use routerd::ids::{RouterId, TenantId};
use routerd::scheduler::SmHandle;
use routerd::state_machine::fakes::{FakeStateMachine, FakeWorkerContext};
use routerd::state_machine::{RouterStateMachine, WorkerContext};
use routerd::tenant_manager::SmFactory;
use routerd::transport::{ChannelTransport, Delivery};

/// Builds a factory that hands out one shared [`FakeStateMachine`] per
/// `(tenant_id, router_id)` pair the test drives directly, plus a means
/// to fetch the handle it created.
fn tracked_sm_factory() -> (Arc<SmFactory>, Arc<Mutex<Vec<(TenantId, RouterId, Arc<Mutex<FakeStateMachine>>)>>>) {
    let created: Arc<Mutex<Vec<(TenantId, RouterId, Arc<Mutex<FakeStateMachine>>)>>> = Arc::new(Mutex::new(Vec::new()));
    let created_for_factory = Arc::clone(&created);
    let factory: Arc<SmFactory> = Arc::new(move |tenant_id, router_id, _reboot_threshold| {
        let concrete = Arc::new(Mutex::new(FakeStateMachine::new(tenant_id, router_id)));
        created_for_factory.lock().push((tenant_id, router_id, Arc::clone(&concrete)));
        concrete as SmHandle
    });
    (factory, created)
}

fn test_engine(
    num_workers: usize,
    debug_store: Arc<dyn DebugStore>,
) -> (Engine, Arc<Mutex<Vec<(TenantId, RouterId, Arc<Mutex<FakeStateMachine>>)>>>) {
    let mut config = Config::default();
    config.num_workers = num_workers;
    let (factory, created) = tracked_sm_factory();
    let context_factory: Arc<dyn Fn() -> Box<dyn WorkerContext> + Send + Sync> =
        Arc::new(|| Box::new(FakeWorkerContext::new(None)) as Box<dyn WorkerContext>);
    let engine = Engine::start(&config, None::<PathBuf>, debug_store, factory, context_factory);
    (engine, created)
}

fn wait_until(mut condition: impl FnMut() -> bool, timeout: Duration) -> bool {
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

fn update_event(tenant: TenantId, router: RouterId) -> Event {
    Event::new(tenant, Some(router), Kind::Update, Map::new())
}

#[test]
fn s1_simple_update_runs_exactly_once() {
    let debug_store = Arc::new(InMemoryDebugStore::new());
    let (engine, created) = test_engine(2, debug_store);
    let tenant = TenantId::generate();
    let router = RouterId::generate();

    engine.handle_message(Delivery::Message {
        target: tenant.to_string(),
        event: update_event(tenant, router),
    });

    assert!(wait_until(|| !created.lock().is_empty(), Duration::from_secs(1)));
    let (_, _, sm) = created.lock()[0].clone();
    assert!(wait_until(|| sm.lock().update_calls >= 1, Duration::from_secs(1)));
    thread::sleep(Duration::from_millis(50));
    assert_eq!(sm.lock().update_calls, 1);
    assert!(!sm.lock().has_more_work());

    engine.shutdown();
}

#[test]
fn s2_rapid_duplicates_enqueue_once_and_reenqueue_after_completion() {
    let debug_store = Arc::new(InMemoryDebugStore::new());
    let (engine, created) = test_engine(1, debug_store);
    let tenant = TenantId::generate();
    let router = RouterId::generate();

    for _ in 0..3 {
        engine.handle_message(Delivery::Message {
            target: tenant.to_string(),
            event: update_event(tenant, router),
        });
    }

    assert!(wait_until(|| !created.lock().is_empty(), Duration::from_secs(1)));
    let (_, _, sm) = created.lock()[0].clone();

    // All three deliveries land in the same state machine's inbox even
    // though only one of them could win the enqueue race.
    assert!(wait_until(|| sm.lock().update_calls >= 3, Duration::from_secs(2)));
    assert!(wait_until(|| !sm.lock().has_more_work(), Duration::from_secs(1)));
    assert!(sm.lock().inbox.is_empty());

    engine.shutdown();
}

#[test]
fn s3_router_rebuild_command_reenters_as_a_rebuild_event() {
    let debug_store = Arc::new(InMemoryDebugStore::new());
    let (engine, created) = test_engine(1, debug_store);
    let tenant = TenantId::generate();
    let router = RouterId::generate();

    let mut body = Map::new();
    body.insert("command".to_string(), Value::String("ROUTER_REBUILD".to_string()));
    body.insert("router_id".to_string(), Value::String(router.to_string()));
    let command_event = Event::new(tenant, Some(router), Kind::Command, body);

    engine.handle_message(Delivery::Message {
        target: tenant.to_string(),
        event: command_event,
    });

    assert!(wait_until(|| !created.lock().is_empty(), Duration::from_secs(1)));
    let (_, _, sm) = created.lock()[0].clone();
    assert!(wait_until(|| !sm.lock().inbox.is_empty() || sm.lock().update_calls > 0, Duration::from_secs(1)));

    engine.shutdown();
}

#[test]
fn s4_router_debug_drops_events_before_send_message() {
    let debug_store = Arc::new(InMemoryDebugStore::new());
    let router = RouterId::generate();
    debug_store.enable_router_debug(router, Some("test".to_string())).unwrap();
    let (engine, created) = test_engine(1, debug_store);
    let tenant = TenantId::generate();

    engine.handle_message(Delivery::Message {
        target: tenant.to_string(),
        event: update_event(tenant, router),
    });

    thread::sleep(Duration::from_millis(100));
    assert!(created.lock().is_empty(), "state machine should never have been created");

    engine.shutdown();
}

#[test]
fn s5_tenant_only_routing_resolves_and_caches_router() {
    let debug_store = Arc::new(InMemoryDebugStore::new());
    let mut config = Config::default();
    config.num_workers = 1;
    let (factory, created) = tracked_sm_factory();
    let router = RouterId::generate();
    let lookups = Arc::new(AtomicUsize::new(0));
    let lookups_for_ctx = Arc::clone(&lookups);
    let context_factory: Arc<dyn Fn() -> Box<dyn WorkerContext> + Send + Sync> = Arc::new(move || {
        struct CountingContext {
            lookups: Arc<AtomicUsize>,
            answer: RouterId,
        }
        impl WorkerContext for CountingContext {
            fn lookup_router_for_tenant(
                &mut self,
                _tenant_id: TenantId,
            ) -> Result<Option<RouterId>, routerd::error::SmError> {
                self.lookups.fetch_add(1, Ordering::SeqCst);
                Ok(Some(self.answer))
            }
        }
        Box::new(CountingContext {
            lookups: Arc::clone(&lookups_for_ctx),
            answer: router,
        }) as Box<dyn WorkerContext>
    });
    let engine = Engine::start(&config, None::<PathBuf>, debug_store, factory, context_factory);
    let tenant = TenantId::generate();

    let no_router_event = Event::new(tenant, None, Kind::Update, Map::new());
    engine.handle_message(Delivery::Message {
        target: tenant.to_string(),
        event: no_router_event.clone(),
    });
    assert!(wait_until(|| !created.lock().is_empty(), Duration::from_secs(1)));
    assert_eq!(created.lock()[0].1, router);

    engine.handle_message(Delivery::Message {
        target: tenant.to_string(),
        event: no_router_event,
    });
    thread::sleep(Duration::from_millis(50));
    assert_eq!(lookups.load(Ordering::SeqCst), 1, "second lookup should hit the cache");

    engine.shutdown();
}

#[test]
fn s6_shutdown_terminates_workers_promptly_under_load() {
    let debug_store = Arc::new(InMemoryDebugStore::new());
    let (engine, created) = test_engine(4, debug_store);
    let tenant = TenantId::generate();

    for _ in 0..20 {
        let router = RouterId::generate();
        engine.handle_message(Delivery::Message {
            target: tenant.to_string(),
            event: update_event(tenant, router),
        });
    }

    let start = std::time::Instant::now();
    engine.shutdown();
    assert!(start.elapsed() < Duration::from_secs(6), "shutdown took too long");
    assert!(!created.lock().is_empty());
}

#[test]
fn channel_transport_drives_the_engine_end_to_end() {
    let debug_store = Arc::new(InMemoryDebugStore::new());
    let (engine, created) = test_engine(2, debug_store);
    let (handle, mut transport) = ChannelTransport::pair();
    let tenant = TenantId::generate();
    let router = RouterId::generate();

    let engine = Arc::new(engine);
    let engine_for_loop = Arc::clone(&engine);
    let loop_handle = thread::spawn(move || engine_for_loop.run(&mut transport));

    handle.send(tenant.to_string(), update_event(tenant, router));
    assert!(wait_until(|| !created.lock().is_empty(), Duration::from_secs(1)));

    handle.shutdown();
    loop_handle.join().unwrap();
}
