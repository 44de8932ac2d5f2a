//! Run a follower and print the synchronized offset.
//!
//! ```text
//! cargo run --example follower -- [config.json]
//! cargo run --example follower -- --mock
//! ```
//!
//! With `--mock` a mock leader is started on loopback and the follower binds
//! an ephemeral loopback port, so the demo runs without a real leader.

use std::time::Duration;

use tracing_subscriber::EnvFilter;
use vision_timesync::testing::{MockLeader, MockLeaderConfig};
use vision_timesync::{TimeSyncClient, TimeSyncConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let arg = std::env::args().nth(1);
    let mock = arg.as_deref() == Some("--mock");
    let config = match arg.as_deref() {
        Some("--mock") => TimeSyncConfig::builder()
            .interface("lo")
            .bind_addr("127.0.0.1:0".parse()?)
            .prefer_hardware(false)
            .build(),
        Some(path) => TimeSyncConfig::from_file(path)?,
        None => TimeSyncConfig::default(),
    };

    let client = TimeSyncClient::new(config)?;
    let mut leader = MockLeader::new(MockLeaderConfig {
        follower_ahead_micros: 12_345,
        ..MockLeaderConfig::default()
    });
    if mock {
        let follower = client.local_addr().ok_or("follower socket has no address")?;
        let addr = leader.start(follower).await?;
        println!("Mock leader on {addr}, follower on {follower}");
    }

    client.start()?;
    for _ in 0..10 {
        tokio::time::sleep(Duration::from_secs(1)).await;
        let stats = client.stats();
        println!(
            "offset={}us now={}us synchronized={} rounds ok={} failed={} timed_out={} delay={}us",
            client.current_offset(),
            client.now(),
            client.is_synchronized(),
            stats.completed,
            stats.failed,
            stats.timed_out,
            stats.last_path_delay_micros,
        );
    }
    client.stop()?;
    leader.stop().await;
    Ok(())
}
