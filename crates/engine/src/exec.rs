//! Run commands inside running containers and collect their output.

use std::sync::Arc;

use testbed_core::config::OutputConfig;
use testbed_core::{
    CreateExecRequest, EngineGateway, Error, ExecResult, OutputEncoding, OutputType, Result,
};

use crate::capabilities::EngineCapabilities;
use crate::output::{Demultiplexer, ToStringConsumer, WaitingConsumer};

pub struct ExecOrchestrator {
    gateway: Arc<dyn EngineGateway>,
    capabilities: Arc<EngineCapabilities>,
    default_encoding: OutputEncoding,
}

impl ExecOrchestrator {
    pub fn new(gateway: Arc<dyn EngineGateway>) -> Self {
        Self {
            capabilities: Arc::new(EngineCapabilities::new(gateway.clone())),
            gateway,
            default_encoding: OutputEncoding::Utf8,
        }
    }

    /// Share capability detection with other components on the same engine.
    pub fn with_capabilities(mut self, capabilities: Arc<EngineCapabilities>) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_default_encoding(mut self, encoding: OutputEncoding) -> Self {
        self.default_encoding = encoding;
        self
    }

    /// Take the default output encoding from configuration.
    pub fn with_config(self, config: &OutputConfig) -> Self {
        self.with_default_encoding(config.encoding)
    }

    /// Run `cmd` in the container and wait for it to finish, decoding output
    /// with the default encoding.
    pub async fn exec_in_container(&self, container_id: &str, cmd: &[&str]) -> Result<ExecResult> {
        self.exec_in_container_with_encoding(container_id, self.default_encoding, cmd)
            .await
    }

    /// Run `cmd` in the container and wait for it to finish.
    ///
    /// Fails with [`Error::Unsupported`] on engines without exec support and
    /// with [`Error::Precondition`] if the container is not running. Nothing
    /// is created on the engine in either case.
    pub async fn exec_in_container_with_encoding(
        &self,
        container_id: &str,
        encoding: OutputEncoding,
        cmd: &[&str],
    ) -> Result<ExecResult> {
        if !self.capabilities.supports_exec().await? {
            return Err(Error::unsupported(
                "exec is not supported by the lxc execution driver",
            ));
        }

        let container = self.gateway.inspect_container(container_id).await?;
        if !container.state.running {
            return Err(Error::precondition(format!(
                "exec can only be used while the container is running (container {})",
                container_id
            )));
        }

        tracing::debug!(container = %container_id, cmd = ?cmd, "Running command in container");
        let request = CreateExecRequest::new(container_id)
            .with_cmd(cmd.iter().copied())
            .with_attach_stdout(true)
            .with_attach_stderr(true);
        let exec_id = self.gateway.create_exec(&request).await?;

        let stdout = Arc::new(ToStringConsumer::new());
        let stderr = Arc::new(ToStringConsumer::new());
        let waiter = Arc::new(WaitingConsumer::new());
        let demux = Demultiplexer::new()
            .with_consumer(OutputType::Stdout, stdout.clone())
            .with_consumer(OutputType::Stderr, stderr.clone())
            .with_consumer_for(&[OutputType::Stdout, OutputType::Stderr], waiter.clone());

        let stream = self.gateway.start_exec(&exec_id).await?;
        let attached = demux.attach(stream);
        waiter.wait_until_end(None).await?;
        attached.close().await?;

        let inspect = self.gateway.inspect_exec(&exec_id).await?;
        let exit_code = inspect.exit_code.ok_or_else(|| {
            Error::engine(format!("exec {} finished without an exit code", exec_id))
        })?;

        let result = ExecResult {
            exit_code,
            stdout: stdout.to_string_with(encoding),
            stderr: stderr.to_string_with(encoding),
        };
        tracing::trace!(
            container = %container_id,
            exit_code,
            stdout = %result.stdout,
            stderr = %result.stderr,
            "Command finished"
        );
        Ok(result)
    }
}
