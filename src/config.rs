//! Startup configuration: every recognized CLI flag is also readable
//! from an environment variable. A bad value here is a configuration
//! error and is fatal before leader election even starts.

use chrono::{NaiveTime, Weekday};
use clap::Parser;

use crate::node::admission::RebootWindow;
use crate::util::Error;

#[derive(Parser, Debug, Clone)]
#[command(name = "node-reboot-operator", version)]
pub struct Cli {
    /// Namespace this controller runs in; also the leader-election
    /// lease namespace and (if `--manage-agent`) the agent workload's
    /// namespace.
    #[arg(long, env = "POD_NAMESPACE")]
    pub pod_namespace: String,

    /// How often the control loop invokes a reconcile pass, in
    /// `parse_duration` syntax (e.g. "30s").
    #[arg(long, env = "RECONCILE_INTERVAL", default_value = "30s")]
    pub reconcile_interval: String,

    /// Comma-separated annotation keys that must all be "true" to
    /// finish pre-check.
    #[arg(long, env = "BEFORE_REBOOT_ANNOTATIONS", value_delimiter = ',')]
    pub before_reboot_annotations: Vec<String>,

    /// Comma-separated annotation keys that must all be "true" to
    /// finish post-check.
    #[arg(long, env = "AFTER_REBOOT_ANNOTATIONS", value_delimiter = ',')]
    pub after_reboot_annotations: Vec<String>,

    /// Start of the recurring weekly admission window, as `"<Weekday>
    /// HH:MM"` (e.g. `"Sat 02:00"`). Unset together with
    /// `--reboot-window-length` means the window is always open.
    #[arg(long, env = "REBOOT_WINDOW_START")]
    pub reboot_window_start: Option<String>,

    /// Length of the admission window, in `parse_duration` syntax (e.g.
    /// "4h").
    #[arg(long, env = "REBOOT_WINDOW_LENGTH")]
    pub reboot_window_length: Option<String>,

    /// Enables the legacy Container Linux auto-labeler.
    #[arg(long, env = "AUTO_LABEL_CONTAINER_LINUX", default_value_t = false)]
    pub auto_label_container_linux: bool,

    /// Enables the legacy agent-workload ensurer. Requires
    /// `--agent-image-repo`.
    #[arg(long, env = "MANAGE_AGENT", default_value_t = false)]
    pub manage_agent: bool,

    /// Image repository for the managed agent workload. Required if
    /// `--manage-agent` is set.
    #[arg(long, env = "AGENT_IMAGE_REPO")]
    pub agent_image_repo: Option<String>,

    /// Port the Prometheus `/metrics` and `/healthz` endpoints listen
    /// on. Unset disables the metrics server entirely.
    #[cfg(feature = "metrics")]
    #[arg(long, env = "METRICS_PORT")]
    pub metrics_port: Option<u16>,
}

impl Cli {
    pub fn reconcile_interval(&self) -> Result<std::time::Duration, Error> {
        Ok(parse_duration::parse(&self.reconcile_interval)?)
    }

    /// Builds the configured reboot window, if any. Both
    /// `reboot_window_start` and `reboot_window_length` must be set
    /// together; leaving both unset means the window is always open.
    pub fn reboot_window(&self) -> Result<Option<RebootWindow>, Error> {
        match (&self.reboot_window_start, &self.reboot_window_length) {
            (None, None) => Ok(None),
            (Some(start), Some(length)) => {
                let (weekday, time) = parse_window_start(start)?;
                Ok(Some(RebootWindow {
                    weekday,
                    start: time,
                    length: chrono::Duration::from_std(parse_duration::parse(length)?)
                        .map_err(|e| Error::Config(format!("reboot window length out of range: {e}")))?,
                }))
            }
            _ => Err(Error::Config(
                "--reboot-window-start and --reboot-window-length must be set together".to_string(),
            )),
        }
    }

    /// Validates `--manage-agent`'s dependency on `--agent-image-repo`
    /// and returns the parsed agent version, if agent management is
    /// enabled.
    pub fn agent_image_repo(&self) -> Result<Option<&str>, Error> {
        if !self.manage_agent {
            return Ok(None);
        }
        self.agent_image_repo
            .as_deref()
            .map(Some)
            .ok_or_else(|| Error::Config("--manage-agent requires --agent-image-repo".to_string()))
    }
}

fn parse_window_start(raw: &str) -> Result<(Weekday, NaiveTime), Error> {
    let (weekday_raw, time_raw) = raw
        .trim()
        .split_once(' ')
        .ok_or_else(|| Error::Config(format!("invalid --reboot-window-start '{raw}', expected '<Weekday> HH:MM'")))?;
    let weekday: Weekday = weekday_raw
        .parse()
        .map_err(|_| Error::Config(format!("invalid weekday in --reboot-window-start: '{weekday_raw}'")))?;
    let time = NaiveTime::parse_from_str(time_raw, "%H:%M")?;
    Ok((weekday, time))
}
