use std::fs::OpenOptions;
use std::sync::Arc;

use clap::Parser;
use env_logger::Target;
use log::info;

use browserfs_bridge::bridge::Bridge;
use browserfs_bridge::config::Args;
use browserfs_bridge::config::TransportKind;
use browserfs_bridge::multiplexer::Multiplexer;
use browserfs_bridge::reader;
use browserfs_bridge::transport;

fn init_logging(verbose: bool) {
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open("log.txt")
        .expect("failed to open log.txt");

    let mut builder = env_logger::Builder::from_default_env();
    if verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(Target::Pipe(Box::new(log_file))).init();
}

fn unmount_stale(mount_point: &std::path::Path) {
    #[cfg(target_os = "linux")]
    let _ = std::process::Command::new("fusermount")
        .arg("-u")
        .arg(mount_point)
        .status();
    #[cfg(target_os = "macos")]
    let _ = std::process::Command::new("umount").arg(mount_point).status();
}

fn main() {
    let args = Args::parse();
    let verbose = args.verbose;
    init_logging(verbose);
    let bridge_config = args.resolve();

    info!("mounting at {:?}", bridge_config.mount_point);
    if let Some(timeout_ms) = bridge_config.timeout_ms {
        info!("per-call timeout configured: {timeout_ms}ms (not yet enforced, calls block indefinitely)");
    }
    unmount_stale(&bridge_config.mount_point);

    let (sender, receiver): (
        Arc<dyn transport::TransportSender>,
        Box<dyn transport::TransportReceiver>,
    ) = match bridge_config.transport {
        TransportKind::Pipe => {
            let (tx, rx) = transport::pipe::new();
            (Arc::new(tx), Box::new(rx))
        }
        TransportKind::Websocket => {
            let (tx, rx) = transport::websocket::new().expect("failed to bind websocket listener");
            (Arc::new(tx), Box::new(rx))
        }
    };

    let multiplexer = Arc::new(Multiplexer::new(sender));
    let _reader = reader::spawn(receiver, Arc::clone(&multiplexer));

    let fs = Bridge::new(multiplexer);
    let mount_options = Args::mount_options();

    fuser::mount2(fs, &bridge_config.mount_point, &mount_options).expect("mount failed");
}
