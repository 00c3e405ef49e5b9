use vcomp_media::{check_ffmpeg, check_ffprobe};
use vcomp_registry::RegistryClient;
use vcomp_storage::StorageLayout;
use vcomp_worker::WorkerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = rustls::crypto::ring::default_provider().install_default();
    dotenvy::dotenv().ok();

    let config = WorkerConfig::from_env();

    println!(
        "worker-selfcheck: starting with hls_root={} temp_root={}",
        config.storage.hls_root.display(),
        config.storage.temp_root.display()
    );
    StorageLayout::new(config.storage.clone()).ensure_roots().await?;

    let ffmpeg = check_ffmpeg(&config.ffmpeg_path)?;
    let ffprobe = check_ffprobe(&config.ffprobe_path)?;
    println!(
        "worker-selfcheck: ffmpeg={} ffprobe={}",
        ffmpeg.display(),
        ffprobe.display()
    );

    ensure_env_present(&[
        "APPWRITE_ENDPOINT",
        "APPWRITE_PROJECT_ID",
        "APPWRITE_API_KEY",
        "DATABASE_ID",
        "COLLECTION_ID",
    ])?;
    RegistryClient::from_env()?.ping().await?;

    println!("worker-selfcheck: ok");
    Ok(())
}

fn ensure_env_present(vars: &[&str]) -> anyhow::Result<()> {
    for var in vars {
        if std::env::var(var).map_or(true, |v| v.trim().is_empty()) {
            return Err(anyhow::anyhow!("missing required env var {}", var));
        }
    }
    Ok(())
}
