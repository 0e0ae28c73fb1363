//! Request handlers, one per message kind

use std::fmt::Display;

use tracing::{info, warn};

use adbgate_proto::{
    status, DeviceList, DirectoryQuery, Envelope, FileTransfer, MessageKind, ShellCommand,
    StatusQuery,
};

use super::{PushTransfer, ResolvedTarget, Session, TargetResolution};
use crate::backend::DeviceExecutor;
use crate::error::ProtocolError;
use crate::transfer::{TransferError, TransferProcessor, TransferSpec};
use crate::websocket::FrameSink;

impl<R: TargetResolution> Session<R> {
    pub(super) async fn handle_directory_get<S>(
        &mut self,
        target: ResolvedTarget,
        mut env: Envelope<DirectoryQuery>,
        sink: &mut S,
    ) where
        S: FrameSink + ?Sized,
    {
        env.device_serial = Some(target.serial);
        let Some(path) = env.payload.path.clone() else {
            let err = ProtocolError::MissingField("path");
            self.reply_error(sink, env, err.to_string()).await;
            return;
        };
        let with_children = env.payload.get_children.unwrap_or(false);

        match target.handle.list_path(&path, with_children).await {
            Ok(node) => {
                env.payload.path_detail = Some(node);
                self.reply(sink, env, status::OK, "Directory get successful.")
                    .await;
            }
            Err(e) => self.reply_error(sink, env, processing_failure(e)).await,
        }
    }

    pub(super) async fn handle_reboot<S>(
        &mut self,
        target: ResolvedTarget,
        mut env: Envelope,
        sink: &mut S,
    ) where
        S: FrameSink + ?Sized,
    {
        env.device_serial = Some(target.serial.clone());
        match target.handle.reboot().await {
            Ok(()) => {
                info!(connection_id = %self.id, serial = %target.serial, "Device reboot requested");
                self.reply(
                    sink,
                    env,
                    status::OK,
                    "Device reboot command successfully executed.",
                )
                .await;
            }
            Err(e) => self.reply_error(sink, env, processing_failure(e)).await,
        }
    }

    pub(super) async fn handle_shell_command<S>(
        &mut self,
        target: ResolvedTarget,
        mut env: Envelope<ShellCommand>,
        sink: &mut S,
    ) where
        S: FrameSink + ?Sized,
    {
        env.device_serial = Some(target.serial);
        let Some(command) = env.payload.shell_command.clone() else {
            let err = ProtocolError::MissingField("shellCommand");
            self.reply_error(sink, env, err.to_string()).await;
            return;
        };

        match target.handle.run_shell(&command).await {
            Ok(output) => {
                env.payload.shell_command_output = Some(output);
                self.reply(sink, env, status::OK, "Command successfully executed.")
                    .await;
            }
            Err(e) => self.reply_error(sink, env, processing_failure(e)).await,
        }
    }

    pub(super) async fn handle_status<S>(
        &mut self,
        target: ResolvedTarget,
        mut env: Envelope<StatusQuery>,
        sink: &mut S,
    ) where
        S: FrameSink + ?Sized,
    {
        env.device_serial = Some(target.serial);
        match target.handle.is_online().await {
            Ok(online) => {
                env.payload.status = Some(online.into());
                self.reply(sink, env, status::OK, "Status successfully executed.")
                    .await;
            }
            Err(e) => self.reply_error(sink, env, processing_failure(e)).await,
        }
    }

    pub(super) async fn handle_devices_get<S>(&mut self, raw: &str, sink: &mut S)
    where
        S: FrameSink + ?Sized,
    {
        let mut env: Envelope<DeviceList> = match Envelope::decode(raw) {
            Ok(env) => env,
            Err(e) => {
                let err = ProtocolError::InvalidPayload(e.to_string());
                self.reject(sink, Some(MessageKind::DevicesGet), None, err)
                    .await;
                return;
            }
        };
        env.message_type = Some(MessageKind::DevicesGet);

        match self.resolution.enumerate().await {
            Ok(devices) => {
                info!(connection_id = %self.id, devices = devices.len(), "Enumerated devices");
                env.payload.devices = Some(devices);
                self.reply(sink, env, status::OK, "Devices get successful.")
                    .await;
            }
            Err(e) => self.reply_error(sink, env, e.to_string()).await,
        }
    }

    pub(super) async fn handle_file_push<S>(
        &mut self,
        target: ResolvedTarget,
        mut env: Envelope<FileTransfer>,
        sink: &mut S,
    ) where
        S: FrameSink + ?Sized,
    {
        env.device_serial = Some(target.serial);
        if self.push.is_some() {
            let err = ProtocolError::TransferInProgress;
            self.reply_error(sink, env, err.to_string()).await;
            return;
        }

        let spec = match transfer_spec(&env.payload, true) {
            Ok(spec) => spec,
            Err(err) => {
                self.reply_error(sink, env, err.to_string()).await;
                return;
            }
        };

        let processor = match TransferProcessor::create(&self.staging_dir, spec).await {
            Ok(processor) => processor,
            Err(e) => {
                warn!(connection_id = %self.id, error = %e, "Failed to stage push");
                self.reply_error(sink, env, format!("File transfer error: {}", e))
                    .await;
                return;
            }
        };

        info!(
            connection_id = %self.id,
            serial = ?env.device_serial,
            remote = %processor.spec().remote_path,
            size = processor.spec().declared_size,
            "File push started"
        );

        self.push = Some(PushTransfer {
            processor,
            target: target.handle,
            request: env.clone(),
        });
        self.reply(sink, env, status::READY, "Ready for push. Waiting for data.")
            .await;
    }

    pub(super) async fn handle_file_pull<S>(
        &mut self,
        target: ResolvedTarget,
        mut env: Envelope<FileTransfer>,
        sink: &mut S,
    ) where
        S: FrameSink + ?Sized,
    {
        env.device_serial = Some(target.serial);
        if self.pull.is_some() {
            let err = ProtocolError::TransferInProgress;
            self.reply_error(sink, env, err.to_string()).await;
            return;
        }

        let spec = match transfer_spec(&env.payload, false) {
            Ok(spec) => spec,
            Err(err) => {
                self.reply_error(sink, env, err.to_string()).await;
                return;
            }
        };

        let processor = match TransferProcessor::create(&self.staging_dir, spec).await {
            Ok(processor) => processor,
            Err(e) => {
                warn!(connection_id = %self.id, error = %e, "Failed to stage pull");
                self.reply_error(sink, env, format!("File transfer error: {}", e))
                    .await;
                return;
            }
        };

        self.pull = Some(processor);
        self.reply(
            sink,
            env.clone(),
            status::READY,
            "Ready to pull. Starting data transfer.",
        )
        .await;

        let outcome = match self.pull.as_mut() {
            Some(processor) => {
                run_pull(processor, target.handle.as_ref(), sink, self.pull_buffer_size).await
            }
            None => Err(TransferError::Released),
        };

        if let Some(mut processor) = self.pull.take() {
            processor.release().await;
        }

        match outcome {
            Ok(sent) => {
                info!(
                    connection_id = %self.id,
                    serial = ?env.device_serial,
                    size = sent,
                    "File pull streamed"
                );
                env.payload.size = Some(sent);
                self.reply(sink, env, status::OK, "File pull successful.")
                    .await;
            }
            Err(e) => {
                warn!(connection_id = %self.id, error = %e, "File pull failed");
                self.reply_error(sink, env, format!("File transfer error: {}", e))
                    .await;
            }
        }
    }
}

/// Stage the remote file, then stream it to the client
async fn run_pull<S>(
    processor: &mut TransferProcessor,
    executor: &dyn DeviceExecutor,
    sink: &mut S,
    buffer_size: usize,
) -> Result<u64, TransferError>
where
    S: FrameSink + ?Sized,
{
    processor.retrieve_from_target(executor).await?;
    processor.stream_to(sink, buffer_size).await
}

/// Validate a transfer request's fields
fn transfer_spec(payload: &FileTransfer, require_size: bool) -> Result<TransferSpec, ProtocolError> {
    let remote_path = payload
        .full_path
        .clone()
        .filter(|p| !p.is_empty())
        .ok_or(ProtocolError::MissingField("fullPath"))?;
    let declared_size = match payload.size {
        Some(size) => size,
        None if require_size => return Err(ProtocolError::MissingField("size")),
        None => 0,
    };
    Ok(TransferSpec {
        remote_path,
        file_name: payload.file_name.clone(),
        declared_size,
    })
}

fn processing_failure(err: impl Display) -> String {
    format!("Error processing message. Error: {}", err)
}
