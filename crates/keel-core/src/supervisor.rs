//! Multi-ASG supervision: the registry of running groups and their
//! control-loop tasks.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio_util::task::TaskTracker;
use tracing::info;

use crate::asg::AutoScalingGroup;
use crate::driver::IaasDriver;
use crate::types::Id;

/// Owns the id → ASG mapping and one control-loop task per group.
///
/// The tracker is the supervisor-scoped join primitive: [`run`] blocks
/// until the tracker is closed and every spawned loop has exited.
///
/// [`run`]: Supervisor::run
#[derive(Debug)]
pub struct Supervisor {
    asgs: RwLock<HashMap<Id, Arc<AutoScalingGroup>>>,
    tracker: TaskTracker,
    driver: Arc<dyn IaasDriver>,
}

impl Supervisor {
    pub fn new(driver: Arc<dyn IaasDriver>) -> Self {
        Self {
            asgs: RwLock::new(HashMap::new()),
            tracker: TaskTracker::new(),
            driver,
        }
    }

    /// Register the group and spawn its control loop. A no-op when the id
    /// is already running.
    pub fn add(&self, asg: Arc<AutoScalingGroup>) {
        {
            let mut asgs = self.asgs.write();
            if asgs.contains_key(asg.id()) {
                return;
            }
            asgs.insert(asg.id().clone(), asg.clone());
        }

        info!(asg = %asg.id(), "starting control loop");
        let driver = self.driver.clone();
        self.tracker.spawn(async move {
            asg.run(driver.as_ref()).await;
        });
    }

    pub fn get(&self, id: &Id) -> Option<Arc<AutoScalingGroup>> {
        self.asgs.read().get(id).cloned()
    }

    /// Signal the group to stop and drop it from the registry. The loop
    /// task observes the signal at its next tick and drains through the
    /// tracker.
    pub fn remove(&self, id: &Id) {
        if let Some(asg) = self.asgs.write().remove(id) {
            info!(asg = %id, "stopping control loop");
            asg.remove();
        }
    }

    pub fn len(&self) -> usize {
        self.asgs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.asgs.read().is_empty()
    }

    /// Stop accepting new loops; [`run`] returns once the running ones
    /// have exited.
    ///
    /// [`run`]: Supervisor::run
    pub fn close(&self) {
        self.tracker.close();
    }

    /// Join every spawned control loop.
    pub async fn run(&self) {
        self.tracker.wait().await;
    }
}
