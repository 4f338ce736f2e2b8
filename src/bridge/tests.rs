use super::*;
use std::collections::HashSet;
use std::time::Duration;

use proptest::prelude::*;
use serde_json::{json, Value};

use crate::assets::PrefabCatalog;
use crate::motion::path::find_path;
use crate::motion::solver::RadialSolver;
use crate::scene::lifecycle::SceneCatalog;
use crate::scene::memory::MemoryScene;
use crate::scene::NodeSpec;
use client::BridgeClient;
use response::{Reply, Response};
use router::{ActionCtx, Domain};

struct Harness {
    app: App,
    router: Arc<Router>,
    runtime: tokio::runtime::Runtime,
}

impl Harness {
    fn new(stage: Stage) -> Self {
        let (dispatcher, queue) = scene_queue();
        let mut app = App::new();
        app.init_resource::<Time>()
            .init_resource::<PathRuns>()
            .init_resource::<OwnerStatus>()
            .insert_resource(queue)
            .insert_resource(stage)
            .add_systems(
                Update,
                (drain_scene_jobs, step_solver, monitor_path_runs).chain(),
            );
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .expect("runtime");
        Self {
            app,
            router: Arc::new(Router::standard(dispatcher)),
            runtime,
        }
    }

    /// Runs one request while ticking the scene owner until it resolves.
    fn send(&mut self, request: Value) -> Value {
        let router = self.router.clone();
        let line = request.to_string();
        let task = self
            .runtime
            .spawn(async move { router.handle_line(&line).await });
        for _ in 0..2000 {
            self.app.update();
            if task.is_finished() {
                break;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        let response = self.runtime.block_on(task).expect("handler task");
        serde_json::to_value(response).expect("response json")
    }

    fn tick(&mut self, millis: u64) {
        self.app
            .world_mut()
            .resource_mut::<Time>()
            .advance_by(Duration::from_millis(millis));
        self.app.update();
    }

    fn stage(&self) -> &Stage {
        self.app.world().resource::<Stage>()
    }
}

fn unit_reach_stage() -> Stage {
    Stage::new(
        Box::<MemoryScene>::default(),
        Box::new(RadialSolver::new(1.0)),
        Box::new(PrefabCatalog::builtin()),
        Box::new(SceneCatalog::new(vec!["Main".to_string()])),
    )
}

fn with_robot(harness: &mut Harness) {
    let spawned = harness.send(json!({
        "type": "ik",
        "params": { "action": "spawn_robot", "prefab_path": "Prefabs/Robots/Robot01.prefab" }
    }));
    assert_eq!(spawned["status"], "success", "{spawned}");
    let path = harness.send(json!({
        "type": "path",
        "params": { "action": "make_path", "robot": "Robot01", "path": "Weld" }
    }));
    assert_eq!(path["status"], "success", "{path}");
}

#[test]
fn router_resolves_names_and_aliases_case_insensitively() {
    let (dispatcher, _queue) = scene_queue();
    let router = Router::standard(dispatcher);
    assert!(router.resolve("scene_node", "find").is_ok());
    assert!(router.resolve("MANAGE_GAMEOBJECT", "Find").is_ok());
    assert!(router.resolve("manage_ik", "path_run").is_ok());
    assert!(matches!(
        router.resolve("teleport", "find"),
        Err(BridgeError::UnknownOperation { kind: "domain", .. })
    ));
    match router.resolve("scene_node", "explode") {
        Err(err @ BridgeError::UnknownOperation { .. }) => {
            assert_eq!(err.to_string(), "Unknown action: 'explode' in 'scene_node'");
            assert!(matches!(
                err,
                BridgeError::UnknownOperation { kind: "action", ref value, scope: Some("scene_node") }
                    if value == "explode"
            ));
        }
        _ => panic!("unknown action must be reported"),
    }
}

proptest! {
    #[test]
    fn router_resolves_or_reports_unknown(domain in "[a-z_]{1,16}", action in "[a-z_]{1,16}") {
        let (dispatcher, _queue) = scene_queue();
        let router = Router::standard(dispatcher);
        let known = router.domains().any(|d| {
            d.name() == domain.as_str() && d.action_names().contains(&action.as_str())
        });
        match router.resolve(&domain, &action) {
            Ok(_) => prop_assert!(known || domain.starts_with("manage_")),
            Err(BridgeError::UnknownOperation { .. }) => prop_assert!(!known),
            Err(other) => prop_assert!(false, "unexpected error {other}"),
        }
    }
}

#[test]
fn find_by_name_returns_the_single_match() {
    let mut stage = Stage::in_memory_default();
    stage.graph.create_node(NodeSpec::named("Robot01")).unwrap();
    stage.graph.create_node(NodeSpec::named("Conveyor")).unwrap();
    let mut harness = Harness::new(stage);

    let reply = harness.send(json!({
        "type": "scene_node",
        "params": { "action": "find", "target": "Robot01", "searchMethod": "by_name", "findAll": false }
    }));
    assert_eq!(reply["status"], "success");
    let found = reply["result"].as_array().unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0]["name"], "Robot01");
}

#[test]
fn unknown_search_method_is_an_error_not_an_empty_result() {
    let mut harness = Harness::new(Stage::in_memory_default());
    let reply = harness.send(json!({
        "type": "scene_node",
        "params": { "action": "find", "target": "x", "searchMethod": "by_smell" }
    }));
    assert_eq!(reply["status"], "error");
    assert_eq!(reply["error"], "Unknown searchMethod: 'by_smell'");
}

#[test]
fn create_modify_and_delete_round_trip() {
    let mut harness = Harness::new(Stage::in_memory_default());
    let created = harness.send(json!({
        "type": "scene_node",
        "params": {
            "action": "create",
            "name": "Crate",
            "primitiveType": "cube",
            "position": [1, 2, 3],
            "componentsToAdd": ["Rigidbody", "Teleporter"],
        }
    }));
    assert_eq!(created["status"], "success", "{created}");
    assert!(created["message"].as_str().unwrap().contains("Teleporter"));
    assert_eq!(created["result"]["transform"]["position"], json!({ "x": 1.0, "y": 2.0, "z": 3.0 }));

    let unchanged = harness.send(json!({
        "type": "scene_node",
        "params": { "action": "modify", "target": "Crate", "position": [1, 2, 3] }
    }));
    assert_eq!(unchanged["status"], "success");
    assert!(unchanged["message"].as_str().unwrap().starts_with("No changes applied"));

    let modified = harness.send(json!({
        "type": "scene_node",
        "params": {
            "action": "modify",
            "target": "Crate",
            "componentProperties": { "Rigidbody": { "mass": 4.5, "spin": 1 } }
        }
    }));
    assert_eq!(modified["status"], "success");
    assert!(modified["message"].as_str().unwrap().contains("spin"));

    let deleted = harness.send(json!({
        "type": "scene_node",
        "params": { "action": "delete", "target": "Crate" }
    }));
    assert_eq!(deleted["result"][0]["name"], "Crate");

    let missing = harness.send(json!({
        "type": "scene_node",
        "params": { "action": "delete", "target": "Crate" }
    }));
    assert_eq!(missing["status"], "error");
}

#[test]
fn bad_component_entries_are_warnings_on_create() {
    let mut harness = Harness::new(Stage::in_memory_default());
    let created = harness.send(json!({
        "type": "scene_node",
        "params": {
            "action": "create",
            "name": "Pallet",
            "componentsToAdd": ["Rigidbody", 42, { "properties": { "mass": 2 } }],
        }
    }));
    assert_eq!(created["status"], "success", "{created}");
    assert!(created["message"].as_str().unwrap().contains("Warnings (2)"), "{created}");
    let names = created["result"]["componentNames"].as_array().unwrap();
    assert!(names.iter().any(|n| n == "Rigidbody"));
}

#[test]
fn structural_components_cannot_be_removed() {
    let mut stage = Stage::in_memory_default();
    stage.graph.create_node(NodeSpec::named("Cube")).unwrap();
    let mut harness = Harness::new(stage);
    let reply = harness.send(json!({
        "type": "scene_node",
        "params": { "action": "remove_component", "target": "Cube", "componentName": "Transform" }
    }));
    assert_eq!(reply["status"], "error");
    assert!(reply["error"].as_str().unwrap().contains("Transform"));
}

#[test]
fn payload_may_arrive_as_json_text() {
    let mut harness = Harness::new(unit_reach_stage());
    with_robot(&mut harness);
    let reply = harness.send(json!({
        "type": "manage_path",
        "params": {
            "action": "make_target",
            "json": "{\"robot\":\"Robot01\",\"path\":\"Weld\",\"name\":\"Pick Up\",\"position\":[0.5,0,0]}"
        }
    }));
    assert_eq!(reply["status"], "success", "{reply}");
    assert_eq!(reply["result"]["name"], "PickUp");
    assert_eq!(reply["result"]["reachable"], true);
}

#[test]
fn unreachable_target_is_reported_and_discarded() {
    let mut harness = Harness::new(unit_reach_stage());
    with_robot(&mut harness);

    let reply = harness.send(json!({
        "type": "path",
        "params": { "action": "make_target", "robot": "Robot01", "path": "Weld", "position": [10, 0, 0] }
    }));
    assert_eq!(reply["status"], "success", "{reply}");
    assert_eq!(reply["result"]["reachable"], false);

    let stage = harness.stage();
    let (_, path) = find_path(stage.graph.as_ref(), "Robot01", "Weld").unwrap();
    assert!(stage.graph.children(path).is_empty());
}

#[test]
fn path_runs_to_completion_through_the_router() {
    let mut harness = Harness::new(unit_reach_stage());
    with_robot(&mut harness);
    for x in [0.2, 0.4] {
        let reply = harness.send(json!({
            "type": "ik",
            "params": {
                "action": "path_add_target",
                "robot": "Robot01",
                "pathName": "Weld",
                "target": { "tcp": [x, 0, 0], "euler": [0, 90, 0], "mode": "LIN" }
            }
        }));
        assert_eq!(reply["result"]["reachable"], true, "{reply}");
    }

    let started = harness.send(json!({
        "type": "path",
        "params": { "action": "start_path", "robot": "Robot01", "path": "Weld" }
    }));
    assert_eq!(started["status"], "success", "{started}");
    let run_id = started["result"]["runId"].as_str().unwrap().to_string();
    assert!(run_id.starts_with("RUN#"));
    assert_eq!(started["result"]["name"], "Weld");

    let again = harness.send(json!({
        "type": "path",
        "params": { "action": "start_path", "robot": "Robot01", "path": "Weld" }
    }));
    assert_eq!(again["status"], "error");

    for _ in 0..20 {
        harness.tick(60);
    }
    let status = harness.send(json!({
        "type": "path",
        "params": { "action": "path_status", "robot": "Robot01", "path": "Weld" }
    }));
    assert_eq!(status["result"]["state"], "Finished", "{status}");
    assert_eq!(status["result"]["runId"], run_id.as_str());

    let stop = harness.send(json!({
        "type": "path",
        "params": { "action": "stop_path", "robot": "Robot01", "path": "Weld" }
    }));
    assert_eq!(stop["status"], "error");
}

#[test]
fn asset_search_pages_results() {
    let mut harness = Harness::new(Stage::in_memory_default());
    let reply = harness.send(json!({
        "type": "asset",
        "params": { "action": "search", "searchPattern": "*.prefab", "pageSize": 1, "pageNumber": 2 }
    }));
    assert_eq!(reply["status"], "success", "{reply}");
    assert_eq!(reply["result"]["totalAssets"], 2);
    assert_eq!(reply["result"]["returned"], 1);
    assert_eq!(reply["result"]["assets"][0]["name"], "Robot01");
}

#[test]
fn huge_paging_values_give_an_empty_page() {
    let mut harness = Harness::new(Stage::in_memory_default());
    let reply = harness.send(json!({
        "type": "asset",
        "params": { "action": "search", "pageSize": 4294967296u64, "pageNumber": 4294967297u64 }
    }));
    assert_eq!(reply["status"], "success", "{reply}");
    assert_eq!(reply["result"]["totalAssets"], 2);
    assert_eq!(reply["result"]["returned"], 0);
}

#[test]
fn scene_hierarchy_lists_active_roots() {
    let mut stage = Stage::in_memory_default();
    let cell = stage.graph.create_node(NodeSpec::named("Cell")).unwrap();
    stage
        .graph
        .create_node(NodeSpec::named("Fixture").under(cell))
        .unwrap();
    let mut harness = Harness::new(stage);
    let reply = harness.send(json!({ "type": "scene", "params": { "action": "get_hierarchy" } }));
    assert_eq!(reply["result"]["scene"], "Main");
    assert_eq!(reply["result"]["roots"][0]["children"][0]["name"], "Fixture");
}

#[test]
fn hundred_jobs_from_ten_threads_run_in_one_tick_without_interleaving() {
    #[derive(Resource, Default)]
    struct Journal(Vec<(usize, usize)>);

    let (dispatcher, queue) = scene_queue();
    let mut app = App::new();
    app.insert_resource(queue)
        .init_resource::<Journal>()
        .add_systems(Update, drain_scene_jobs);

    let submitters: Vec<_> = (0..10)
        .map(|thread| {
            let dispatcher = dispatcher.clone();
            std::thread::spawn(move || {
                (0..10)
                    .map(|seq| {
                        dispatcher.submit(move |world: &mut World| {
                            let mut journal = world.resource_mut::<Journal>();
                            journal.0.push((thread, seq));
                            Ok(journal.0.len())
                        })
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();
    let pending: Vec<_> = submitters
        .into_iter()
        .flat_map(|handle| handle.join().unwrap())
        .collect();

    app.update();

    let seen: HashSet<usize> = pending.into_iter().map(|p| p.blocking().unwrap()).collect();
    assert_eq!(seen, (1..=100).collect::<HashSet<_>>());
    let journal = &app.world().resource::<Journal>().0;
    assert_eq!(journal.len(), 100);
    for thread in 0..10 {
        let order: Vec<usize> = journal
            .iter()
            .filter(|(t, _)| *t == thread)
            .map(|(_, seq)| *seq)
            .collect();
        assert_eq!(order, (0..10).collect::<Vec<_>>());
    }
}

#[test]
fn panicking_job_is_reported_and_the_owner_keeps_going() {
    let (dispatcher, queue) = scene_queue();
    let mut app = App::new();
    app.insert_resource(queue).add_systems(Update, drain_scene_jobs);

    let boom = dispatcher.submit(|_: &mut World| -> BridgeResult<()> { panic!("boom") });
    let after = dispatcher.submit(|_: &mut World| Ok(7));
    app.update();
    assert!(matches!(boom.blocking(), Err(BridgeError::CollaboratorFailure(msg)) if msg.contains("boom")));
    assert_eq!(after.blocking().unwrap(), 7);
}

#[test]
fn closed_owner_resolves_to_dispatcher_closed() {
    let (dispatcher, queue) = scene_queue();
    drop(queue);
    let pending = dispatcher.submit(|_: &mut World| Ok(()));
    assert!(matches!(pending.blocking(), Err(BridgeError::DispatcherClosed)));
}

fn test_config(port: u16) -> BridgeConfig {
    BridgeConfig {
        port,
        buffer_size: 256,
        connection_timeout_secs: 5.0,
        retry_delay_secs: 0.05,
        ..Default::default()
    }
}

async fn start_server() -> transport::ServerHandle {
    let (dispatcher, _queue) = scene_queue();
    let router = Arc::new(Router::standard(dispatcher));
    BridgeServer::new(test_config(0), router)
        .start()
        .await
        .expect("server start")
}

#[tokio::test]
async fn ping_is_answered_identically_every_time() {
    let server = start_server().await;
    let mut client = BridgeClient::connect(server.local_addr(), &test_config(0))
        .await
        .unwrap();
    let pong = serde_json::to_value(Response::pong()).unwrap();
    for _ in 0..5 {
        assert_eq!(client.ping().await.unwrap(), pong);
    }
    server.stop();
}

#[tokio::test]
async fn bad_lines_get_error_replies_and_the_connection_survives() {
    let server = start_server().await;
    let mut client = BridgeClient::connect(server.local_addr(), &test_config(0))
        .await
        .unwrap();

    let malformed = client.send_line("{\"type\": oops").await.unwrap();
    assert_eq!(malformed["status"], "error");
    assert_eq!(malformed["error"], "Invalid JSON format");

    let oversized = client.send_line(&"x".repeat(1000)).await.unwrap();
    assert_eq!(oversized["status"], "error");

    let unknown = client
        .request("teleport", json!({ "action": "go" }))
        .await
        .unwrap();
    assert_eq!(unknown["error"], "Unknown domain: 'teleport'");

    assert_eq!(client.ping().await.unwrap()["result"]["message"], "pong");
    server.stop();
}

async fn exploding_handler(_: ActionCtx) -> BridgeResult<Reply> {
    panic!("handler blew up")
}

#[tokio::test]
async fn handler_panic_is_an_error_reply_and_the_connection_survives() {
    let (dispatcher, _queue) = scene_queue();
    let router = Router::new(dispatcher)
        .domain(Domain::new("fault", &[]).action("explode", exploding_handler));
    let server = BridgeServer::new(test_config(0), Arc::new(router))
        .start()
        .await
        .expect("server start");
    let mut client = BridgeClient::connect(server.local_addr(), &test_config(0))
        .await
        .unwrap();

    let reply = client.request("fault", json!({ "action": "explode" })).await.unwrap();
    assert_eq!(reply["status"], "error");
    assert_eq!(reply["error"], "Request handler panicked.");
    assert_eq!(client.ping().await.unwrap()["result"]["message"], "pong");
    server.stop();
}

#[tokio::test]
async fn second_bind_on_a_taken_port_fails_fast() {
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = taken.local_addr().unwrap().port();
    let (dispatcher, _queue) = scene_queue();
    let router = Arc::new(Router::standard(dispatcher));
    let result = BridgeServer::new(test_config(port), router).start().await;
    assert!(matches!(result, Err(BridgeError::PortInUse { port: p }) if p == port));
}

#[tokio::test]
async fn stop_is_idempotent_and_closes_the_listener() {
    let server = start_server().await;
    let addr = server.local_addr();
    server.stop();
    server.stop();
    assert!(server.is_stopped());
    server.stopped().await;
    assert!(tokio::net::TcpStream::connect(addr).await.is_err());
}
