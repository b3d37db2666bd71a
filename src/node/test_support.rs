//! In-memory `NodeStore` used only by tests. Lets the reconciler, mutator
//! and admission-policy tests script exact conflict sequences and
//! multi-pass scenarios without a live API server.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Node;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::core::ErrorResponse;

use super::store::NodeStore;
use crate::util::Error;

pub fn node_with(name: &str, annotations: &[(&str, &str)], labels: &[(&str, &str)]) -> Node {
    Node {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            resource_version: Some("1".to_string()),
            annotations: Some(
                annotations
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ),
            labels: Some(
                labels
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ),
            ..Default::default()
        },
        ..Default::default()
    }
}

struct Inner {
    nodes: BTreeMap<String, Node>,
    /// Remaining scripted conflicts per node name: the next N `update`
    /// calls for that name fail with a conflict before succeeding.
    scripted_conflicts: BTreeMap<String, usize>,
}

/// A `NodeStore` backed by an in-memory map, with monotonically
/// incrementing `resourceVersion`s and the ability to script a run of
/// conflicts for a given node name.
pub struct MockNodeStore {
    inner: Mutex<Inner>,
}

impl MockNodeStore {
    pub fn new(nodes: Vec<Node>) -> Self {
        let nodes = nodes
            .into_iter()
            .map(|n| (n.metadata.name.clone().expect("node needs a name"), n))
            .collect();
        Self {
            inner: Mutex::new(Inner {
                nodes,
                scripted_conflicts: BTreeMap::new(),
            }),
        }
    }

    /// The next `count` `update()` calls against `name` fail with a
    /// conflict, regardless of whether the resourceVersion actually
    /// matches — used to exercise the mutator's retry loop.
    pub fn script_conflicts(&self, name: &str, count: usize) {
        self.inner
            .lock()
            .unwrap()
            .scripted_conflicts
            .insert(name.to_string(), count);
    }

    pub fn snapshot(&self, name: &str) -> Option<Node> {
        self.inner.lock().unwrap().nodes.get(name).cloned()
    }
}

fn conflict_error() -> Error {
    Error::from(kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message: "the object has been modified".to_string(),
        reason: "Conflict".to_string(),
        code: 409,
    }))
}

#[async_trait]
impl NodeStore for MockNodeStore {
    async fn list(&self) -> Result<Vec<Node>, Error> {
        Ok(self.inner.lock().unwrap().nodes.values().cloned().collect())
    }

    async fn get(&self, name: &str) -> Result<Node, Error> {
        self.inner
            .lock()
            .unwrap()
            .nodes
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UserInput(format!("no such node: {name}")))
    }

    async fn update(&self, mut node: Node) -> Result<Node, Error> {
        let name = node
            .metadata
            .name
            .clone()
            .ok_or_else(|| Error::UserInput("node is missing metadata.name".to_string()))?;
        let mut inner = self.inner.lock().unwrap();

        if let Some(remaining) = inner.scripted_conflicts.get_mut(&name) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(conflict_error());
            }
        }

        let current = inner
            .nodes
            .get(&name)
            .ok_or_else(|| Error::UserInput(format!("no such node: {name}")))?;
        if current.metadata.resource_version != node.metadata.resource_version {
            return Err(conflict_error());
        }

        let next_version = current
            .metadata
            .resource_version
            .as_deref()
            .unwrap_or("0")
            .parse::<u64>()
            .unwrap_or(0)
            + 1;
        node.metadata.resource_version = Some(next_version.to_string());
        inner.nodes.insert(name, node.clone());
        Ok(node)
    }
}
