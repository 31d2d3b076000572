use std::sync::Arc;
use streamfs::config::Config;
use streamfs::fs::Fs;
use streamfs::logger::Logger;
use streamfs::remote::{LocalStore, RemoteStore, Retrying};
use tokio::signal::unix::{signal, SignalKind};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = Config::from_env().unwrap_or_else(|e| {
        eprintln!("bad config: {}", e);
        std::process::exit(1);
    });
    Logger::init().add_file(&cfg.log_path, true);
    log::set_max_level(cfg.log_level);

    let args: Vec<String> = std::env::args().collect();
    if args.len() != 3 {
        eprintln!("{} store_dir mount_point", args[0]);
        std::process::exit(1);
    }
    let (store_dir, mount_point) = (&args[1], &args[2]);
    println!("log write to {} level {}", cfg.log_path, cfg.log_level);

    let local = LocalStore::new(store_dir, cfg.chunk_size as usize)?;
    let store: Arc<dyn RemoteStore> = Arc::new(Retrying::new(local, cfg.open_retries, cfg.retry_delay));
    let fs = match Fs::new(store, &cfg) {
        Err(e) => {
            log::error!("load store {} fail, error {}", store_dir, e);
            eprintln!("load store {} fail, error {}", store_dir, e);
            std::process::exit(1);
        }
        Ok(fs) => fs,
    };

    let options = [
        fuser::MountOption::FSName("streamfs".to_string()),
        fuser::MountOption::Subtype("streamfs".to_string()),
        fuser::MountOption::RO,
    ];
    let session = fuser::spawn_mount2(fs, mount_point, &options)?;
    let mut sig_int = signal(SignalKind::interrupt())?;
    let mut sig_term = signal(SignalKind::terminate())?;

    tokio::select! {
        _ = sig_int.recv() => log::info!("got SIGINT, unmount {}", mount_point),
        _ = sig_term.recv() => log::info!("got SIGTERM, unmount {}", mount_point),
    }
    session.join();
    Ok(())
}
