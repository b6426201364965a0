use std::sync::Arc;

use topicmux_transport::Endpoint;
use tracing::debug;

use crate::conn::{MuxConfig, MuxConn};
use crate::error::Result;
use crate::serializer::Serializer;
use crate::topic::Topic;

/// Connect to `endpoint` and wrap the stream in a [`MuxConn`].
pub async fn dial(
    endpoint: &Endpoint,
    serializer: Arc<dyn Serializer>,
    config: MuxConfig,
) -> Result<MuxConn> {
    dial_with_topics(endpoint, serializer, config, Vec::new()).await
}

/// Connect and register `topics` before the first frame is read.
pub async fn dial_with_topics(
    endpoint: &Endpoint,
    serializer: Arc<dyn Serializer>,
    config: MuxConfig,
    topics: impl IntoIterator<Item = Topic>,
) -> Result<MuxConn> {
    let stream = topicmux_transport::connect(endpoint).await?;
    let conn = MuxConn::with_topics(stream, serializer, config, topics)?;
    debug!(conn = conn.id(), %endpoint, "dialed");
    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConnError;
    use crate::serializer::JsonSerializer;

    #[tokio::test]
    async fn dial_missing_endpoint_is_a_transport_error() {
        let endpoint = Endpoint::tcp("127.0.0.1:1");
        let result = dial(&endpoint, Arc::new(JsonSerializer), MuxConfig::default()).await;
        assert!(matches!(result, Err(ConnError::Transport(_))));
    }
}
