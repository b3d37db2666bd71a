//! Abstraction over the object-store contract this crate consumes:
//! list nodes, get a node by name, update a node with optimistic
//! concurrency. Writing the reconciler, mutator and admission policy
//! against this trait rather than `kube::Api<Node>` directly is what
//! makes the scripted multi-pass scenarios in the test suite testable
//! without a live API server.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Node;
use kube::api::{Api, ListParams, PostParams};
use kube::Client;

use crate::util::Error;

#[async_trait]
pub trait NodeStore: Send + Sync {
    async fn list(&self) -> Result<Vec<Node>, Error>;
    async fn get(&self, name: &str) -> Result<Node, Error>;
    /// Persists `node`. The node's `metadata.resource_version` must match
    /// what the store currently holds for that name; a mismatch is
    /// reported as a conflict (`Error::is_conflict()`).
    async fn update(&self, node: Node) -> Result<Node, Error>;
}

pub struct KubeNodeStore {
    api: Api<Node>,
}

impl KubeNodeStore {
    pub fn new(client: Client) -> Self {
        Self {
            api: Api::all(client),
        }
    }
}

#[async_trait]
impl NodeStore for KubeNodeStore {
    async fn list(&self) -> Result<Vec<Node>, Error> {
        let list = self.api.list(&ListParams::default()).await?;
        Ok(list.items)
    }

    async fn get(&self, name: &str) -> Result<Node, Error> {
        Ok(self.api.get(name).await?)
    }

    async fn update(&self, node: Node) -> Result<Node, Error> {
        let name = node
            .metadata
            .name
            .clone()
            .ok_or_else(|| Error::UserInput("node is missing metadata.name".to_string()))?;
        // `replace` round-trips the full object including resourceVersion,
        // so the API server rejects it with HTTP 409 if the stored version
        // has moved on since this node was read.
        Ok(self.api.replace(&name, &PostParams::default(), &node).await?)
    }
}
