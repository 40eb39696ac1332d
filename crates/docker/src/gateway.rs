//! Docker engine gateway.
//!
//! Translates [`EngineGateway`] intents into Docker Engine API calls and maps
//! the replies back into core types. Image and network payloads are read
//! from their JSON form so the raw engine reply can be kept alongside.

use async_trait::async_trait;
use bollard::errors::Error as DockerError;
use futures::StreamExt;
use serde_json::Value;

use testbed_core::config::DockerConfig;
use testbed_core::{
    parse_engine_timestamp, ContainerInfo, ContainerState, CreateExecRequest,
    CreateNetworkRequest, EngineGateway, EngineInfo, Error, ExecInspect, FrameStream,
    HealthStatus, ImageInspect, ImageSummary, LogsRequest, OutputFrame, OutputType, Result,
};

/// Tag Docker reports for images without one.
const UNTAGGED: &str = "<none>:<none>";

/// Gateway talking to a Docker daemon.
pub struct DockerGateway {
    docker: bollard::Docker,
}

impl DockerGateway {
    /// Connect using `config`, falling back to the local defaults
    /// (`DOCKER_HOST` or the platform socket) when no host is set.
    pub fn connect(config: &DockerConfig) -> Result<Self> {
        let docker = match config.host.as_deref() {
            None => bollard::Docker::connect_with_local_defaults()
                .map(|d| d.with_timeout(std::time::Duration::from_secs(config.timeout_secs))),
            Some(host) if host.starts_with("unix://") => bollard::Docker::connect_with_unix(
                host,
                config.timeout_secs,
                bollard::API_DEFAULT_VERSION,
            ),
            Some(host) => bollard::Docker::connect_with_http(
                host,
                config.timeout_secs,
                bollard::API_DEFAULT_VERSION,
            ),
        }
        .map_err(|e| {
            Error::engine(format!(
                "Failed to connect to Docker daemon: {}. Is Docker running?",
                e
            ))
        })?;

        tracing::debug!(host = ?config.host, "Docker client configured");
        Ok(Self { docker })
    }

    /// Wrap an existing bollard client.
    pub fn from_client(docker: bollard::Docker) -> Self {
        Self { docker }
    }

    /// Whether the daemon answers.
    pub async fn ping(&self) -> Result<()> {
        self.docker
            .ping()
            .await
            .map(|_| ())
            .map_err(|e| map_docker_error("ping", e))
    }
}

#[async_trait]
impl EngineGateway for DockerGateway {
    async fn info(&self) -> Result<EngineInfo> {
        let version = self
            .docker
            .version()
            .await
            .map_err(|e| map_docker_error("version", e))?;
        // Daemons no longer report an execution driver; lxc support was
        // removed long before the API versions bollard speaks.
        Ok(EngineInfo {
            server_version: version.version,
            api_version: version.api_version,
            operating_system: version.os,
            execution_driver: None,
        })
    }

    async fn inspect_container(&self, container_id: &str) -> Result<ContainerInfo> {
        use bollard::container::InspectContainerOptions;

        let response = self
            .docker
            .inspect_container(container_id, None::<InspectContainerOptions>)
            .await
            .map_err(|e| map_docker_error("inspect container", e))?;

        let state = response
            .state
            .map(|s| ContainerState {
                running: s.running.unwrap_or(false),
                paused: s.paused.unwrap_or(false),
                exit_code: s.exit_code,
                started_at: s.started_at.as_deref().and_then(parse_engine_timestamp),
                finished_at: s.finished_at.as_deref().and_then(parse_engine_timestamp),
                health: s.health.and_then(|h| h.status).and_then(map_health),
            })
            .unwrap_or_default();

        Ok(ContainerInfo {
            id: response.id.unwrap_or_else(|| container_id.to_string()),
            name: response.name.unwrap_or_default(),
            state,
        })
    }

    async fn create_exec(&self, request: &CreateExecRequest) -> Result<String> {
        use bollard::exec::CreateExecOptions;

        let options = CreateExecOptions {
            cmd: Some(request.cmd.clone()),
            attach_stdout: Some(request.attach_stdout),
            attach_stderr: Some(request.attach_stderr),
            user: request.user.clone(),
            working_dir: request.working_dir.clone(),
            env: (!request.env.is_empty()).then(|| request.env.clone()),
            ..Default::default()
        };

        let exec = self
            .docker
            .create_exec(&request.container_id, options)
            .await
            .map_err(|e| map_docker_error("create exec", e))?;
        Ok(exec.id)
    }

    async fn start_exec(&self, exec_id: &str) -> Result<FrameStream> {
        use bollard::exec::StartExecResults;

        let started = self
            .docker
            .start_exec(exec_id, None)
            .await
            .map_err(|e| map_docker_error("start exec", e))?;

        match started {
            StartExecResults::Attached { output, .. } => Ok(frames(output)),
            StartExecResults::Detached => Ok(futures::stream::empty().boxed()),
        }
    }

    async fn inspect_exec(&self, exec_id: &str) -> Result<ExecInspect> {
        let inspect = self
            .docker
            .inspect_exec(exec_id)
            .await
            .map_err(|e| map_docker_error("inspect exec", e))?;
        Ok(ExecInspect {
            running: inspect.running.unwrap_or(false),
            exit_code: inspect.exit_code,
        })
    }

    async fn list_images(&self) -> Result<Vec<ImageSummary>> {
        use bollard::image::ListImagesOptions;

        let images = self
            .docker
            .list_images(Some(ListImagesOptions::<String> {
                all: false,
                ..Default::default()
            }))
            .await
            .map_err(|e| map_docker_error("list images", e))?;

        images
            .iter()
            .map(|image| {
                serde_json::to_value(image)
                    .map(image_summary_from)
                    .map_err(Error::from)
            })
            .collect()
    }

    async fn inspect_image(&self, reference: &str) -> Result<ImageInspect> {
        let image = self
            .docker
            .inspect_image(reference)
            .await
            .map_err(|e| map_docker_error("inspect image", e))?;
        Ok(image_inspect_from(serde_json::to_value(&image)?))
    }

    async fn create_network(&self, request: &CreateNetworkRequest) -> Result<String> {
        use bollard::network::CreateNetworkOptions;

        let options = CreateNetworkOptions::<String> {
            name: request.name.clone(),
            check_duplicate: request.check_duplicate,
            driver: request.driver.clone().unwrap_or_else(|| "bridge".to_string()),
            internal: request.internal,
            attachable: request.attachable,
            enable_ipv6: request.enable_ipv6.unwrap_or(false),
            options: request.options.clone(),
            labels: request.labels.clone(),
            ..Default::default()
        };

        let response = self
            .docker
            .create_network(options)
            .await
            .map_err(|e| map_docker_error("create network", e))?;

        serde_json::to_value(&response)?
            .get("Id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .ok_or_else(|| Error::engine(format!("network {} created without an id", request.name)))
    }

    async fn remove_network(&self, network_id: &str) -> Result<()> {
        self.docker
            .remove_network(network_id)
            .await
            .map_err(|e| map_docker_error("remove network", e))
    }

    async fn logs(&self, request: &LogsRequest) -> Result<FrameStream> {
        use bollard::container::LogsOptions;

        let options = LogsOptions::<String> {
            follow: request.follow,
            stdout: request.stdout,
            stderr: request.stderr,
            since: request.since,
            tail: "all".to_string(),
            ..Default::default()
        };
        Ok(frames(self.docker.logs(&request.container_id, Some(options))))
    }
}

/// Keep stdout and stderr frames. TTY containers send raw console output,
/// which is treated as stdout; stdin echoes are dropped.
fn frames<S>(output: S) -> FrameStream
where
    S: futures::Stream<Item = std::result::Result<bollard::container::LogOutput, DockerError>>
        + Send
        + 'static,
{
    use bollard::container::LogOutput;

    output
        .filter_map(|item| async move {
            match item {
                Ok(LogOutput::StdOut { message }) => {
                    Some(Ok(OutputFrame::new(OutputType::Stdout, message)))
                }
                Ok(LogOutput::StdErr { message }) => {
                    Some(Ok(OutputFrame::new(OutputType::Stderr, message)))
                }
                Ok(LogOutput::Console { message }) => {
                    Some(Ok(OutputFrame::new(OutputType::Stdout, message)))
                }
                Ok(LogOutput::StdIn { .. }) => None,
                Err(e) => Some(Err(map_docker_error("output stream", e))),
            }
        })
        .boxed()
}

fn map_health(status: bollard::models::HealthStatusEnum) -> Option<HealthStatus> {
    use bollard::models::HealthStatusEnum;

    match status {
        HealthStatusEnum::STARTING => Some(HealthStatus::Starting),
        HealthStatusEnum::HEALTHY => Some(HealthStatus::Healthy),
        HealthStatusEnum::UNHEALTHY => Some(HealthStatus::Unhealthy),
        HealthStatusEnum::NONE => Some(HealthStatus::None),
        HealthStatusEnum::EMPTY => None,
    }
}

fn repo_tags(raw: &Value) -> Option<Vec<String>> {
    let tags: Vec<String> = raw
        .get("RepoTags")?
        .as_array()?
        .iter()
        .filter_map(Value::as_str)
        .filter(|tag| *tag != UNTAGGED)
        .map(str::to_string)
        .collect();
    (!tags.is_empty()).then_some(tags)
}

fn image_id(raw: &Value) -> String {
    raw.get("Id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn image_summary_from(raw: Value) -> ImageSummary {
    ImageSummary {
        id: image_id(&raw),
        repo_tags: repo_tags(&raw),
        created: raw.get("Created").and_then(Value::as_i64).unwrap_or_default(),
        raw,
    }
}

fn image_inspect_from(raw: Value) -> ImageInspect {
    ImageInspect {
        id: image_id(&raw),
        repo_tags: repo_tags(&raw).unwrap_or_default(),
        created: raw
            .get("Created")
            .and_then(Value::as_str)
            .and_then(parse_engine_timestamp),
        raw,
    }
}

/// Classify a bollard error by the daemon's status code.
fn map_docker_error(operation: &str, err: DockerError) -> Error {
    match err {
        DockerError::DockerResponseServerError {
            status_code: 404,
            message,
        } => Error::not_found(format!("{}: {}", operation, message)),
        DockerError::DockerResponseServerError {
            status_code: 501,
            message,
        } => Error::unsupported(format!("{}: {}", operation, message)),
        other => Error::engine(format!("{} failed: {}", operation, other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn server_error(status_code: u16) -> DockerError {
        DockerError::DockerResponseServerError {
            status_code,
            message: "boom".to_string(),
        }
    }

    #[test]
    fn test_error_mapping_by_status() {
        assert!(map_docker_error("inspect image", server_error(404)).is_not_found());
        assert!(map_docker_error("list images", server_error(501)).is_unsupported());
        assert!(matches!(
            map_docker_error("create network", server_error(500)),
            Error::Engine(_)
        ));
    }

    #[test]
    fn test_summary_skips_untagged_marker() {
        let summary = image_summary_from(json!({
            "Id": "sha256:abc",
            "RepoTags": ["<none>:<none>"],
            "Created": 1700000000
        }));
        assert_eq!(summary.id, "sha256:abc");
        assert_eq!(summary.repo_tags, None);
        assert_eq!(summary.created, 1_700_000_000);

        let tagged = image_summary_from(json!({
            "Id": "sha256:def",
            "RepoTags": ["redis:7", "<none>:<none>"],
            "Created": 1
        }));
        assert_eq!(tagged.repo_tags, Some(vec!["redis:7".to_string()]));
    }

    #[test]
    fn test_inspect_parses_created() {
        let inspect = image_inspect_from(json!({
            "Id": "sha256:abc",
            "RepoTags": ["alpine:3.19"],
            "Created": "2024-01-27T00:30:48.743965523Z"
        }));
        assert_eq!(inspect.repo_tags, vec!["alpine:3.19"]);
        assert!(inspect.created.is_some());
    }

    #[test]
    fn test_health_mapping() {
        use bollard::models::HealthStatusEnum;
        assert_eq!(map_health(HealthStatusEnum::HEALTHY), Some(HealthStatus::Healthy));
        assert_eq!(map_health(HealthStatusEnum::EMPTY), None);
    }

    #[tokio::test]
    async fn test_frames_drop_stdin_echo() {
        use bollard::container::LogOutput;

        let raw = futures::stream::iter(vec![
            Ok(LogOutput::StdIn { message: "typed".into() }),
            Ok(LogOutput::StdOut { message: "out".into() }),
            Ok(LogOutput::StdErr { message: "err".into() }),
        ]);
        let collected: Vec<OutputFrame> = frames(raw)
            .map(|f| f.unwrap())
            .collect()
            .await;
        assert_eq!(
            collected,
            vec![OutputFrame::stdout("out"), OutputFrame::stderr("err")]
        );
    }

    #[tokio::test]
    async fn test_tty_console_output_is_stdout() {
        use bollard::container::LogOutput;

        let raw = futures::stream::iter(vec![
            Ok(LogOutput::Console { message: "tty line\n".into() }),
            Ok(LogOutput::StdIn { message: "typed".into() }),
        ]);
        let collected: Vec<OutputFrame> = frames(raw)
            .map(|f| f.unwrap())
            .collect()
            .await;
        assert_eq!(collected, vec![OutputFrame::stdout("tty line\n")]);
    }
}
