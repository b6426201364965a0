use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use topicmux_transport::{Endpoint, Listener};
use tracing::info;

use crate::conn::{MuxConfig, MuxConn};
use crate::error::Result;
use crate::serializer::Serializer;
use crate::topic::Topic;

/// Listens for and accepts multiplexed connections.
pub struct MuxListener {
    listener: Listener,
    serializer: Arc<dyn Serializer>,
    config: MuxConfig,
    next_conn_id: AtomicU64,
}

impl MuxListener {
    /// Bind to `endpoint`.
    pub async fn bind(endpoint: &Endpoint, serializer: Arc<dyn Serializer>) -> Result<Self> {
        let listener = Listener::bind(endpoint).await?;
        Ok(Self {
            listener,
            serializer,
            config: MuxConfig::default(),
            next_conn_id: AtomicU64::new(1),
        })
    }

    /// Override the config applied to accepted connections.
    pub fn with_config(mut self, config: MuxConfig) -> Self {
        self.config = config;
        self
    }

    /// The bound endpoint (with the real port for `tcp://host:0`).
    pub fn endpoint(&self) -> &Endpoint {
        self.listener.endpoint()
    }

    /// Accept the next connection with no topics registered.
    pub async fn accept(&self) -> Result<MuxConn> {
        self.accept_with_topics(Vec::new()).await
    }

    /// Accept the next connection and register `topics` before its first
    /// frame is read.
    pub async fn accept_with_topics(
        &self,
        topics: impl IntoIterator<Item = Topic>,
    ) -> Result<MuxConn> {
        let stream = self.listener.accept().await?;
        let id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        let conn = MuxConn::from_parts(
            format!("conn-{id}"),
            stream,
            Arc::clone(&self.serializer),
            self.config.clone(),
            topics,
        )?;
        info!(conn = conn.id(), endpoint = %self.endpoint(), "accepted connection");
        Ok(conn)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::conn::CloseReason;
    use crate::connector::dial;
    use crate::serializer::BinarySerializer;

    fn temp_dir(tag: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "topicmux-conn-{tag}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
        dir
    }

    #[tokio::test]
    async fn tcp_dial_publish_and_receive() {
        let listener = MuxListener::bind(&Endpoint::tcp("127.0.0.1:0"), Arc::new(BinarySerializer))
            .await
            .expect("bind should succeed");
        let endpoint = listener.endpoint().clone();

        let client = tokio::spawn(async move {
            let conn = dial(&endpoint, Arc::new(BinarySerializer), MuxConfig::default())
                .await
                .expect("dial should succeed");
            conn.publish_to("dog", "woof").await.expect("publish should succeed");
            conn.close().await.expect("close should succeed");
        });

        let dog = Topic::new("dog");
        let mut sub = dog.subscribe();
        let conn = listener
            .accept_with_topics([dog])
            .await
            .expect("accept should succeed");
        assert_eq!(conn.id(), "conn-1");

        let body = tokio::time::timeout(Duration::from_secs(5), sub.recv())
            .await
            .expect("message should arrive")
            .expect("subscription should be open");
        assert_eq!(body.as_ref(), b"woof");

        client.await.expect("client task should finish");
        let reason = tokio::time::timeout(Duration::from_secs(5), conn.closed())
            .await
            .expect("peer close should be observed");
        assert!(matches!(reason, CloseReason::Eof));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unix_accepts_sequential_connections() {
        let dir = temp_dir("uds");
        let endpoint = Endpoint::unix(dir.join("mux.sock"));
        let listener = MuxListener::bind(&endpoint, Arc::new(BinarySerializer))
            .await
            .expect("bind should succeed")
            .with_config(MuxConfig::default().with_read_deadline(Duration::from_secs(5)));

        for expected in ["conn-1", "conn-2"] {
            let dial_endpoint = endpoint.clone();
            let client = tokio::spawn(async move {
                let conn = dial(&dial_endpoint, Arc::new(BinarySerializer), MuxConfig::default())
                    .await
                    .expect("dial should succeed");
                conn.publish_to("cat", "meow").await.expect("publish should succeed");
                conn.close().await.expect("close should succeed");
            });

            let conn = listener.accept().await.expect("accept should succeed");
            assert_eq!(conn.id(), expected);
            client.await.expect("client task should finish");
            conn.close().await.expect("close should succeed");
        }

        drop(listener);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
