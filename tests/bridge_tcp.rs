use std::time::Duration;

use bevy::prelude::*;
use serde_json::{json, Value};

use scene_bridge::bridge::client::BridgeClient;
use scene_bridge::bridge::BridgeAddress;
use scene_bridge::{BridgeConfig, BridgePlugin};

fn config() -> BridgeConfig {
    BridgeConfig {
        port: 0,
        connection_timeout_secs: 10.0,
        retry_delay_secs: 0.05,
        solver_reach: 1.0,
        ..Default::default()
    }
}

/// Runs `script` against a live bridge while this thread plays scene owner.
fn drive<F>(script: F) -> Vec<Value>
where
    F: FnOnce(std::net::SocketAddr, BridgeConfig) -> Vec<Value> + Send + 'static,
{
    let mut app = App::new();
    app.init_resource::<Time>()
        .add_plugins(BridgePlugin::new(config()));
    let addr = app.world().resource::<BridgeAddress>().0;

    let client = std::thread::spawn(move || script(addr, config()));
    while !client.is_finished() {
        app.update();
        std::thread::sleep(Duration::from_millis(2));
    }
    client.join().expect("client thread")
}

#[test]
fn robot_authoring_session_over_tcp() {
    let replies = drive(|addr, config| {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async move {
            let mut client = BridgeClient::connect(addr, &config).await.unwrap();
            let mut replies = vec![client.ping().await.unwrap()];
            for (domain, params) in [
                ("ik", json!({ "action": "spawn_robot", "prefab_path": "Prefabs/Robots/Robot01.prefab" })),
                ("ik", json!({ "action": "path_create", "robot": "Robot01", "pathName": "Weld", "props": { "speedOverride": 2.0 } })),
                ("ik", json!({ "action": "path_add_target", "robot": "Robot01", "pathName": "Weld", "target": { "tcp": [0.5, 0, 0] } })),
                ("ik", json!({ "action": "path_add_target", "robot": "Robot01", "pathName": "Weld", "target": { "tcp": [10, 0, 0] } })),
                ("scene_node", json!({ "action": "find", "target": "Robot01", "searchMethod": "by_name" })),
                ("manage_scene", json!({ "action": "get_active" })),
                ("nowhere", json!({ "action": "find" })),
            ] {
                replies.push(client.request(domain, params).await.unwrap());
            }
            replies
        })
    });

    assert_eq!(replies[0], json!({ "status": "success", "result": { "message": "pong" } }));
    assert_eq!(replies[1]["status"], "success", "{}", replies[1]);
    assert_eq!(replies[2]["result"]["name"], "Weld");
    assert_eq!(replies[3]["result"]["reachable"], true);
    assert_eq!(replies[4]["result"]["reachable"], false);
    assert_eq!(replies[5]["result"][0]["name"], "Robot01");
    assert_eq!(replies[6]["result"]["name"], "Main");
    assert_eq!(replies[7]["status"], "error");
    assert_eq!(replies[7]["error"], "Unknown domain: 'nowhere'");
}

#[test]
fn concurrent_clients_each_get_their_own_replies() {
    let replies = drive(|addr, config| {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async move {
            let tasks: Vec<_> = (0..4)
                .map(|i| {
                    let config = config.clone();
                    tokio::spawn(async move {
                        let mut client = BridgeClient::connect(addr, &config).await.unwrap();
                        client
                            .request(
                                "scene_node",
                                json!({ "action": "create", "name": format!("Box{i}") }),
                            )
                            .await
                            .unwrap()
                    })
                })
                .collect();
            let mut replies = Vec::new();
            for task in tasks {
                replies.push(task.await.unwrap());
            }
            replies
        })
    });

    for (i, reply) in replies.iter().enumerate() {
        assert_eq!(reply["status"], "success");
        assert_eq!(reply["result"]["name"], format!("Box{i}"));
    }
}
