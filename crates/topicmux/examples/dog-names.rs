//! Dog names example: a listener publishes a dog name every second on topic
//! "dog"; a client subscribes and prints them until Ctrl-C.
//!
//! Run with:
//!   cargo run --example dog-names

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use topicmux::conn::{dial, BinarySerializer, MuxConfig, MuxListener};
use topicmux::transport::Endpoint;

const NAMES: &[&str] = &[
    "Biscuit", "Bruno", "Daisy", "Luna", "Max", "Nala", "Pepper", "Rex", "Rocky", "Toby",
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let sock_dir = std::env::temp_dir().join(format!("topicmux-dogs-{}", std::process::id()));
    std::fs::create_dir_all(&sock_dir)?;
    let endpoint = Endpoint::unix(sock_dir.join("dogs.sock"));

    let listener = MuxListener::bind(&endpoint, Arc::new(BinarySerializer)).await?;
    tokio::spawn(async move {
        loop {
            let conn = match listener.accept().await {
                Ok(conn) => conn,
                Err(err) => {
                    eprintln!("[server] accept failed: {err}");
                    return;
                }
            };
            eprintln!("[server] {} connected", conn.id());
            tokio::spawn(async move {
                let mut seed = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.subsec_nanos() as usize)
                    .unwrap_or(7);
                loop {
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    // LCG step.
                    seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                    let name = NAMES[(seed >> 8) % NAMES.len()];
                    if conn.publish_to("dog", name).await.is_err() {
                        break;
                    }
                }
            });
        }
    });

    let client = dial(&endpoint, Arc::new(BinarySerializer), MuxConfig::default()).await?;
    let mut dogs = client.register_topic("dog")?.subscribe();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            name = dogs.recv() => match name {
                Some(name) => eprintln!("dog: {}", String::from_utf8_lossy(&name)),
                None => break,
            },
        }
    }

    client.close().await?;
    let _ = std::fs::remove_dir_all(&sock_dir);
    Ok(())
}
