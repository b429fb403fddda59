use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::Result;
use crate::ids::NodeId;
use crate::tasks::Task;


/// Hands a resolved task to the agent on one node.
///
/// Implementations only deliver the work; the agent reports back through
/// `Engine::apply_status` and `Engine::apply_output`.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, task: &Task, node: &NodeId) -> Result<()>;
}


/// Per-node queue that agents drain by polling.
#[derive(Debug, Default)]
pub struct NodeQueue {
    queues: Mutex<HashMap<NodeId, VecDeque<Task>>>,
}

impl NodeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take everything queued for `node`.
    pub async fn poll(&self, node: &NodeId) -> Vec<Task> {
        match self.queues.lock().await.get_mut(node) {
            Some(queue) => queue.drain(..).collect(),
            None => vec![],
        }
    }

    pub async fn pending(&self, node: &NodeId) -> usize {
        self.queues.lock().await.get(node).map(|q| q.len()).unwrap_or(0)
    }
}

#[async_trait]
impl Dispatcher for NodeQueue {
    async fn dispatch(&self, task: &Task, node: &NodeId) -> Result<()> {
        debug!(task_id = %task.id, node_id = %node, "queued for node");
        self.queues
            .lock()
            .await
            .entry(node.clone())
            .or_default()
            .push_back(task.clone());
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn poll_drains_only_the_node_queue() {
        let queue = NodeQueue::new();
        let a = NodeId::new("a");
        let b = NodeId::new("b");
        let task = Task::new("t", vec![a.clone(), b.clone()]);

        queue.dispatch(&task, &a).await.unwrap();
        queue.dispatch(&task, &b).await.unwrap();
        queue.dispatch(&task, &a).await.unwrap();

        assert_eq!(queue.poll(&a).await.len(), 2);
        assert!(queue.poll(&a).await.is_empty());
        assert_eq!(queue.pending(&b).await, 1);
    }
}
