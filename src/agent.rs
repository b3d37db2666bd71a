//! Legacy agent-workload ensurer: at startup, when configured with an
//! image repository, makes sure exactly one `DaemonSet` running the
//! agent binary exists in this controller's own namespace. New
//! deployments are expected to supply the workload externally and
//! leave this disabled.

use k8s_openapi::api::apps::v1::{DaemonSet, DaemonSetSpec};
use k8s_openapi::api::core::v1::{
    Container, EnvVar, EnvVarSource, ObjectFieldSelector, PodSpec, PodTemplateSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::api::{DeleteParams, ObjectMeta, PropagationPolicy};
use kube::{Api, Client, ResourceExt};
use owo_colors::OwoColorize;
use semver::Version;
use std::collections::BTreeMap;

use crate::node::constants::AGENT_VERSION;
use crate::util::{Error, MANAGER_NAME};

const LABEL_MANAGED_BY: &str = "managed-by";
const LABEL_APP: &str = "app";
const APP_VALUE: &str = "agent";
const WORKLOAD_NAME: &str = "node-reboot-agent";

pub struct AgentEnsurerConfig {
    pub namespace: String,
    pub image_repo: String,
    pub version: Version,
}

fn managed_labels() -> BTreeMap<String, String> {
    BTreeMap::from([
        (LABEL_MANAGED_BY.to_string(), MANAGER_NAME.to_string()),
        (LABEL_APP.to_string(), APP_VALUE.to_string()),
    ])
}

fn desired_daemonset(config: &AgentEnsurerConfig) -> DaemonSet {
    let labels = managed_labels();
    let mut annotations = BTreeMap::new();
    annotations.insert(AGENT_VERSION.to_string(), config.version.to_string());

    DaemonSet {
        metadata: ObjectMeta {
            name: Some(WORKLOAD_NAME.to_string()),
            namespace: Some(config.namespace.clone()),
            labels: Some(labels.clone()),
            annotations: Some(annotations),
            ..Default::default()
        },
        spec: Some(DaemonSetSpec {
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: APP_VALUE.to_string(),
                        image: Some(format!("{}:{}", config.image_repo, config.version)),
                        env: Some(vec![
                            EnvVar {
                                name: "NODE_NAME".to_string(),
                                value_from: Some(EnvVarSource {
                                    field_ref: Some(ObjectFieldSelector {
                                        field_path: "spec.nodeName".to_string(),
                                        ..Default::default()
                                    }),
                                    ..Default::default()
                                }),
                                ..Default::default()
                            },
                            EnvVar {
                                name: "POD_NAMESPACE".to_string(),
                                value_from: Some(EnvVarSource {
                                    field_ref: Some(ObjectFieldSelector {
                                        field_path: "metadata.namespace".to_string(),
                                        ..Default::default()
                                    }),
                                    ..Default::default()
                                }),
                                ..Default::default()
                            },
                        ]),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        status: None,
    }
}

fn running_version(existing: &DaemonSet) -> Result<Version, Error> {
    let raw = existing
        .annotations()
        .get(AGENT_VERSION)
        .ok_or_else(|| {
            Error::InvariantViolation(format!(
                "managed daemonset '{}' is missing the '{AGENT_VERSION}' annotation",
                existing.name_any()
            ))
        })?;
    Version::parse(raw).map_err(|_| {
        Error::InvariantViolation(format!(
            "managed daemonset '{}' has an unparseable version annotation: '{raw}'",
            existing.name_any()
        ))
    })
}

/// Ensures exactly one managed agent `DaemonSet` exists and is at least
/// as new as `config.version`. Fails hard on more than one matching
/// workload, or on a missing/unparseable version annotation — these
/// are invariant violations, not transient errors.
pub async fn ensure(client: Client, config: &AgentEnsurerConfig) -> Result<(), Error> {
    let api: Api<DaemonSet> = Api::namespaced(client, &config.namespace);
    let selector = format!("{LABEL_MANAGED_BY}={MANAGER_NAME},{LABEL_APP}={APP_VALUE}");
    let existing = api
        .list(&kube::api::ListParams::default().labels(&selector))
        .await?;

    match existing.items.len() {
        0 => {
            println!(
                "{}",
                format!("🚀 creating agent workload '{WORKLOAD_NAME}'").green()
            );
            api.create(&Default::default(), &desired_daemonset(config))
                .await?;
        }
        1 => {
            let current = &existing.items[0];
            let version = running_version(current)?;
            if version < config.version {
                println!(
                    "{}",
                    format!(
                        "♻️ agent workload '{WORKLOAD_NAME}' is out of date ({version} < {}), recreating",
                        config.version
                    )
                    .yellow()
                );
                api.delete(
                    WORKLOAD_NAME,
                    &DeleteParams {
                        propagation_policy: Some(PropagationPolicy::Foreground),
                        ..Default::default()
                    },
                )
                .await?;
                api.create(&Default::default(), &desired_daemonset(config))
                    .await?;
            } else {
                println!(
                    "{}",
                    format!("✅ agent workload '{WORKLOAD_NAME}' is up to date (v{version})").green()
                );
            }
        }
        n => {
            return Err(Error::InvariantViolation(format!(
                "expected at most one managed agent workload, found {n}"
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AgentEnsurerConfig {
        AgentEnsurerConfig {
            namespace: "ops".to_string(),
            image_repo: "registry.example.com/agent".to_string(),
            version: Version::parse("1.2.3").unwrap(),
        }
    }

    #[test]
    fn desired_daemonset_carries_name_namespace_and_version_annotation() {
        let ds = desired_daemonset(&config());
        assert_eq!(ds.metadata.name.as_deref(), Some(WORKLOAD_NAME));
        assert_eq!(ds.metadata.namespace.as_deref(), Some("ops"));
        assert_eq!(
            ds.metadata.annotations.as_ref().unwrap().get(AGENT_VERSION),
            Some(&"1.2.3".to_string())
        );
        assert_eq!(
            ds.metadata.labels.as_ref().unwrap().get(LABEL_APP),
            Some(&APP_VALUE.to_string())
        );
    }

    #[test]
    fn desired_daemonset_selector_matches_its_own_pod_template_labels() {
        let ds = desired_daemonset(&config());
        let spec = ds.spec.unwrap();
        assert_eq!(
            spec.selector.match_labels,
            spec.template.metadata.unwrap().labels
        );
    }

    #[test]
    fn desired_daemonset_container_uses_the_configured_image_and_advertises_node_identity() {
        let ds = desired_daemonset(&config());
        let container = &ds.spec.unwrap().template.spec.unwrap().containers[0];
        assert_eq!(
            container.image.as_deref(),
            Some("registry.example.com/agent:1.2.3")
        );
        let env_names: Vec<&str> = container
            .env
            .as_ref()
            .unwrap()
            .iter()
            .map(|e| e.name.as_str())
            .collect();
        assert_eq!(env_names, vec!["NODE_NAME", "POD_NAMESPACE"]);
    }

    fn daemonset_with_version_annotation(value: Option<&str>) -> DaemonSet {
        let mut annotations = BTreeMap::new();
        if let Some(value) = value {
            annotations.insert(AGENT_VERSION.to_string(), value.to_string());
        }
        DaemonSet {
            metadata: ObjectMeta {
                name: Some(WORKLOAD_NAME.to_string()),
                annotations: Some(annotations),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn running_version_parses_a_valid_annotation() {
        let ds = daemonset_with_version_annotation(Some("2.0.0"));
        assert_eq!(running_version(&ds).unwrap(), Version::parse("2.0.0").unwrap());
    }

    #[test]
    fn running_version_fails_when_annotation_is_missing() {
        let ds = daemonset_with_version_annotation(None);
        assert!(matches!(
            running_version(&ds),
            Err(Error::InvariantViolation(_))
        ));
    }

    #[test]
    fn running_version_fails_when_annotation_is_unparseable() {
        let ds = daemonset_with_version_annotation(Some("not-a-version"));
        assert!(matches!(
            running_version(&ds),
            Err(Error::InvariantViolation(_))
        ));
    }
}
