//! Human-readable events published to the object-store's event sink,
//! under the `reboot-reconciler` source name. Leader election
//! publishes under its own source (see `crate::leader`).

use k8s_openapi::api::core::v1::{Node, ObjectReference};
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::{Client, Resource};

use crate::util::Error;

pub const RECONCILER_SOURCE: &str = "reboot-reconciler";
pub const LEADER_ELECTION_SOURCE: &str = "reboot-leader-election";

pub struct EventPublisher {
    recorder: Recorder,
}

impl EventPublisher {
    pub fn new(client: Client, source: &str) -> Self {
        Self {
            recorder: Recorder::new(client, Reporter::from(source.to_string())),
        }
    }

    pub async fn publish_node(
        &self,
        node: &Node,
        type_: EventType,
        reason: impl Into<String>,
        note: impl Into<String>,
        action: impl Into<String>,
    ) -> Result<(), Error> {
        self.publish_reference(node.object_ref(&()), type_, reason, note, action)
            .await
    }

    pub async fn publish_reference(
        &self,
        reference: ObjectReference,
        type_: EventType,
        reason: impl Into<String>,
        note: impl Into<String>,
        action: impl Into<String>,
    ) -> Result<(), Error> {
        self.recorder
            .publish(
                &Event {
                    type_,
                    reason: reason.into(),
                    note: Some(note.into()),
                    action: action.into(),
                    secondary: None,
                },
                &reference,
            )
            .await?;
        Ok(())
    }
}

/// Builds an `ObjectReference` to the `Lease` backing leader election.
/// `kube_leader_election::LeaseLock` owns the lease's lifecycle and
/// doesn't hand back the live object, so the reference is constructed by
/// hand from the parameters the lock itself was built with.
pub fn lease_reference(namespace: &str, name: &str) -> ObjectReference {
    ObjectReference {
        api_version: Some("coordination.k8s.io/v1".to_string()),
        kind: Some("Lease".to_string()),
        namespace: Some(namespace.to_string()),
        name: Some(name.to_string()),
        ..Default::default()
    }
}
