//! Device access through the `adb` command line tool
//!
//! [`AdbRegistry`] lists devices with `adb devices` and hands out
//! [`AdbDevice`] handles that run every operation as `adb -s <serial> ...`.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use adbgate_api::{DeviceExecutor, DeviceRegistry, ExecutionError, TargetHandle};
use adbgate_proto::FileNode;

/// Invoker for the adb binary
#[derive(Debug, Clone)]
pub struct Adb {
    program: PathBuf,
}

impl Adb {
    /// Use the adb binary at `program` (looked up on PATH if relative)
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// First line of `adb version`
    pub async fn version(&self) -> Result<String, ExecutionError> {
        let output = self.run(["version"]).await?;
        Ok(output.lines().next().unwrap_or_default().to_string())
    }

    /// Run adb with `args` and return stdout
    ///
    /// A non-zero exit becomes `CommandFailed` carrying stderr (or stdout if
    /// stderr is empty).
    async fn run<I, S>(&self, args: I) -> Result<String, ExecutionError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut command = Command::new(&self.program);
        command.args(args).kill_on_drop(true);
        debug!(command = ?command.as_std(), "Running adb");

        let output = command.output().await?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = if stderr.trim().is_empty() {
                stdout.trim()
            } else {
                stderr.trim()
            };
            return Err(ExecutionError::CommandFailed(detail.to_string()));
        }
        Ok(stdout)
    }
}

/// Registry backed by `adb devices`
pub struct AdbRegistry {
    adb: Adb,
}

impl AdbRegistry {
    /// Create a registry using `adb`
    pub fn new(adb: Adb) -> Self {
        Self { adb }
    }

    async fn serials(&self) -> Vec<String> {
        match self.adb.run(["devices"]).await {
            Ok(output) => parse_devices(&output),
            Err(e) => {
                warn!(error = %e, "Failed to list adb devices");
                Vec::new()
            }
        }
    }

    fn handle(&self, serial: &str) -> TargetHandle {
        Arc::new(AdbDevice::new(self.adb.clone(), serial))
    }
}

#[async_trait]
impl DeviceRegistry for AdbRegistry {
    async fn resolve(&self, serial: &str) -> Option<TargetHandle> {
        self.serials()
            .await
            .iter()
            .any(|s| s == serial)
            .then(|| self.handle(serial))
    }

    async fn enumerate(&self) -> Vec<(String, TargetHandle)> {
        self.serials()
            .await
            .into_iter()
            .map(|serial| {
                let handle = self.handle(&serial);
                (serial, handle)
            })
            .collect()
    }
}

/// One device addressed by serial
#[derive(Debug, Clone)]
pub struct AdbDevice {
    adb: Adb,
    serial: String,
}

impl AdbDevice {
    /// Address `serial` through `adb`
    pub fn new(adb: Adb, serial: impl Into<String>) -> Self {
        Self {
            adb,
            serial: serial.into(),
        }
    }

    async fn run<I, S>(&self, args: I) -> Result<String, ExecutionError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut full: Vec<std::ffi::OsString> = vec!["-s".into(), self.serial.clone().into()];
        full.extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self.adb.run(full).await
    }

    async fn shell(&self, command: &str) -> Result<String, ExecutionError> {
        self.run(["shell", command]).await
    }
}

#[async_trait]
impl DeviceExecutor for AdbDevice {
    async fn run_shell(&self, command: &str) -> Result<String, ExecutionError> {
        self.shell(command).await
    }

    async fn reboot(&self) -> Result<(), ExecutionError> {
        self.run(["reboot"]).await?;
        Ok(())
    }

    async fn is_online(&self) -> Result<bool, ExecutionError> {
        match self.run(["get-state"]).await {
            Ok(state) => Ok(state.trim() == "device"),
            // adb exits non-zero for offline and unauthorized devices
            Err(ExecutionError::CommandFailed(reason)) => {
                debug!(serial = %self.serial, reason = %reason, "Device not online");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    async fn list_path(
        &self,
        path: &str,
        with_children: bool,
    ) -> Result<FileNode, ExecutionError> {
        let quoted = shell_quote(path);
        let output = self.shell(&format!("ls -lad {}", quoted)).await?;
        let entry = output
            .lines()
            .find_map(parse_ls_line)
            .ok_or_else(|| ExecutionError::CommandFailed(format!("cannot stat {}", path)))?;

        let mut node = entry.into_node(path);
        if with_children && node.directory {
            let listing = self.shell(&format!("ls -la {}", quoted)).await?;
            node.children = listing
                .lines()
                .filter_map(parse_ls_line)
                .filter(|e| e.name != "." && e.name != "..")
                .map(|e| {
                    let child = join_remote(path, &e.name);
                    e.into_node(&child)
                })
                .collect();
        }
        Ok(node)
    }

    async fn deliver_file(&self, local: &Path, remote: &str) -> Result<(), ExecutionError> {
        self.run([OsStr::new("push"), local.as_os_str(), OsStr::new(remote)])
            .await?;
        Ok(())
    }

    async fn retrieve_file(&self, remote: &str, local: &Path) -> Result<(), ExecutionError> {
        self.run([OsStr::new("pull"), OsStr::new(remote), local.as_os_str()])
            .await?;
        Ok(())
    }
}

/// Serials from `adb devices` output, in listed order
fn parse_devices(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| {
            !line.is_empty() && !line.starts_with("List of devices") && !line.starts_with('*')
        })
        .filter_map(|line| line.split_whitespace().next())
        .map(str::to_string)
        .collect()
}

/// One line of `ls -l` output
#[derive(Debug, Clone, PartialEq, Eq)]
struct LsEntry {
    permissions: String,
    size: Option<u64>,
    modified: String,
    name: String,
}

impl LsEntry {
    fn into_node(self, path: &str) -> FileNode {
        let name = path
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .filter(|n| !n.is_empty())
            .unwrap_or("/")
            .to_string();
        FileNode {
            name,
            path: path.to_string(),
            directory: self.permissions.starts_with('d'),
            size: self.size,
            permissions: Some(self.permissions),
            modified: Some(self.modified),
            children: Vec::new(),
        }
    }
}

/// Parse `perms links owner group size date time name`
///
/// Returns None for the `total` header and anything that does not fit.
/// Symlink targets (`name -> target`) are dropped from the name.
fn parse_ls_line(line: &str) -> Option<LsEntry> {
    let mut rest = line.trim_end();
    let mut fields = Vec::with_capacity(7);
    for _ in 0..7 {
        rest = rest.trim_start();
        let end = rest.find(char::is_whitespace)?;
        fields.push(&rest[..end]);
        rest = &rest[end..];
    }

    let permissions = fields[0];
    let kind = permissions.chars().next()?;
    if permissions.len() < 10 || !"-dlcbps".contains(kind) {
        return None;
    }

    let mut name = rest.trim_start();
    if permissions.starts_with('l') {
        if let Some((link, _target)) = name.split_once(" -> ") {
            name = link;
        }
    }
    if name.is_empty() {
        return None;
    }

    Some(LsEntry {
        permissions: permissions.to_string(),
        size: fields[4].parse().ok(),
        modified: format!("{} {}", fields[5], fields[6]),
        name: name.to_string(),
    })
}

/// Single-quote `value` for the device shell
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

fn join_remote(dir: &str, name: &str) -> String {
    if dir.ends_with('/') {
        format!("{}{}", dir, name)
    } else {
        format!("{}/{}", dir, name)
    }
}
