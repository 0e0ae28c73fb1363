//! adbgate CLI library

pub mod bridge;
pub mod error;

pub use error::{Error, Result};

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use adbgate_api::{start_server, ServerConfig};
use bridge::{Adb, AdbRegistry};

/// adbgate - websocket gateway to adb-managed devices
#[derive(Parser, Debug)]
#[command(name = "adbgate")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Address to listen on
    #[arg(long, env = "ADBGATE_LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Directory for transfer staging files [default: system temp dir]
    #[arg(long, env = "ADBGATE_STAGING_DIR")]
    pub staging_dir: Option<PathBuf>,

    /// Path to the adb binary
    #[arg(long, env = "ADBGATE_ADB_PATH", default_value = "adb")]
    pub adb_path: PathBuf,

    /// Do not serve the /admin/adb endpoint
    #[arg(long, env = "ADBGATE_DISABLE_ADMIN")]
    pub disable_admin: bool,
}

impl Cli {
    /// Server settings derived from the flags
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            addr: self.listen,
            staging_dir: self
                .staging_dir
                .clone()
                .unwrap_or_else(std::env::temp_dir),
            admin_enabled: !self.disable_admin,
        }
    }

    /// Run the gateway until Ctrl-C
    pub async fn run(self) -> Result<()> {
        let adb = Adb::new(self.adb_path.clone());
        let version = adb.version().await.map_err(|e| Error::AdbUnavailable {
            path: self.adb_path.display().to_string(),
            message: e.to_string(),
        })?;
        info!(adb = %self.adb_path.display(), version = %version, "Using adb");

        let config = self.server_config();
        prepare_staging_dir(&config.staging_dir).await?;
        let registry = Arc::new(AdbRegistry::new(adb));

        start_server(config, registry, shutdown_signal()).await?;
        Ok(())
    }
}

/// Create the staging directory up front so a bad path fails at startup
async fn prepare_staging_dir(dir: &Path) -> Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["adbgate"]).unwrap();
        assert_eq!(cli.listen, "0.0.0.0:8080".parse::<SocketAddr>().unwrap());
        assert_eq!(cli.adb_path, PathBuf::from("adb"));

        let config = cli.server_config();
        assert!(config.admin_enabled);
        assert_eq!(config.staging_dir, std::env::temp_dir());
    }

    #[test]
    fn test_flags_map_into_server_config() {
        let cli = Cli::try_parse_from([
            "adbgate",
            "--listen",
            "127.0.0.1:9000",
            "--staging-dir",
            "/var/lib/adbgate",
            "--adb-path",
            "/opt/platform-tools/adb",
            "--disable-admin",
        ])
        .unwrap();

        let config = cli.server_config();
        assert_eq!(config.addr.port(), 9000);
        assert_eq!(config.staging_dir, PathBuf::from("/var/lib/adbgate"));
        assert!(!config.admin_enabled);
        assert_eq!(cli.adb_path, PathBuf::from("/opt/platform-tools/adb"));
    }

    #[test]
    fn test_rejects_bad_listen_address() {
        assert!(Cli::try_parse_from(["adbgate", "--listen", "not-an-addr"]).is_err());
    }

    #[tokio::test]
    async fn test_prepare_staging_dir() {
        let root = tempfile::tempdir().unwrap();
        let nested = root.path().join("var/adbgate");
        prepare_staging_dir(&nested).await.unwrap();
        assert!(nested.is_dir());

        let blocker = root.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        let err = prepare_staging_dir(&blocker.join("staging"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
