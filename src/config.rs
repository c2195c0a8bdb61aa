use std::path::PathBuf;

use clap::Parser;
use clap::ValueEnum;
use fuser::Config as MountConfig;
use fuser::MountOption;

const DEFAULT_MOUNT_DIR: &str = "mnt";

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum TransportKind {
    Pipe,
    Websocket,
}

/// CLI surface. The mount point is the single mandatory positional
/// argument; everything else has a default that preserves the bridge's
/// baseline behavior (native-messaging pipe, untimed calls).
#[derive(Parser)]
#[command(version, about = "Mount a live browser's runtime state as a filesystem")]
pub struct Args {
    /// Directory to mount at. Falls back to $TABFS_MOUNT_DIR, then "mnt".
    mount_point: Option<PathBuf>,

    /// Which wire transport to speak to the peer over.
    #[clap(long, value_enum, default_value_t = TransportKind::Pipe)]
    pub transport: TransportKind,

    /// Abandon a blocked call after this many milliseconds (unset: wait
    /// indefinitely, matching the baseline untimed behavior).
    #[clap(long)]
    pub timeout_ms: Option<u64>,

    /// Raise the log level to debug.
    #[clap(short, long)]
    pub verbose: bool,
}

pub struct BridgeConfig {
    pub mount_point: PathBuf,
    pub transport: TransportKind,
    pub timeout_ms: Option<u64>,
}

impl Args {
    pub fn resolve(self) -> BridgeConfig {
        let mount_point = self
            .mount_point
            .or_else(|| std::env::var_os("TABFS_MOUNT_DIR").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_MOUNT_DIR));

        BridgeConfig {
            mount_point,
            transport: self.transport,
            timeout_ms: self.timeout_ms,
        }
    }

    pub fn mount_options() -> MountConfig {
        let mut config = MountConfig::default();
        config.mount_options.push(MountOption::AutoUnmount);
        config.mount_options.push(MountOption::FSName("browserfs".to_string()));
        config
    }
}
