//! The full supervision path: a registered group's control loop detects a
//! failing node and replaces it without operator involvement.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use keel_core::{node_set, AutoScalingGroup, Id, Supervisor};
use keel_driver::LocalDriver;
use keel_tests::{health_policy, test_node, tick_window};

#[tokio::test(start_paused = true)]
async fn control_loop_replaces_failing_node() {
    let driver = Arc::new(LocalDriver::new());
    driver.seed("node1");
    let supervisor = Supervisor::new(driver.clone());

    let asg = Arc::new(AutoScalingGroup::new("asg-1"));
    asg.setup(node_set([test_node("node1")]), [health_policy(1, 1, 1, 3)])
        .unwrap();

    // node1 reports all-failing health for the whole test.
    asg.add_metrics(&Id::new("node1"), tick_window(Utc::now(), 5))
        .unwrap();

    supervisor.add(asg.clone());

    // Three loop ticks accumulate three strikes; the relaunch executes in
    // the same tick that trips the node.
    let mut replaced = false;
    for _ in 0..600 {
        if driver.destroyed().iter().any(|id| id == "node1") {
            replaced = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    assert!(replaced, "control loop never replaced the failing node");
    assert!(driver.created_count() >= 1);
    assert!(!asg.nodes_snapshot().iter().any(|n| n.id == Id::new("node1")));

    supervisor.remove(&Id::new("asg-1"));
    assert!(asg.stopped());
    assert!(supervisor.get(&Id::new("asg-1")).is_none());

    supervisor.close();
    tokio::time::timeout(Duration::from_secs(120), supervisor.run())
        .await
        .expect("all control loops drain after removal");
}
