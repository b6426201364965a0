use std::fs;

use bytes::Bytes;
use topicmux_conn::{dial, MuxConfig};
use tracing::debug;

use crate::cmd::{parse_duration, PublishArgs, SerializerKind};
use crate::exit::{conn_error, io_error, CliResult, SUCCESS};

pub async fn run(args: PublishArgs, serializer: SerializerKind) -> CliResult<i32> {
    let interval = args.interval.as_deref().map(parse_duration).transpose()?;
    let body = resolve_body(&args)?;

    let conn = dial(&args.endpoint, serializer.build(), MuxConfig::default())
        .await
        .map_err(|err| conn_error("connect failed", err))?;

    for sent in 0..args.repeat {
        if sent > 0 {
            if let Some(interval) = interval {
                tokio::time::sleep(interval).await;
            }
        }
        conn.publish_to(&args.topic, body.clone())
            .await
            .map_err(|err| conn_error("publish failed", err))?;
    }
    debug!(
        conn = conn.id(),
        topic = %args.topic,
        count = args.repeat,
        size = body.len(),
        "published"
    );

    conn.close()
        .await
        .map_err(|err| conn_error("close failed", err))?;
    Ok(SUCCESS)
}

fn resolve_body(args: &PublishArgs) -> CliResult<Bytes> {
    if let Some(data) = &args.data {
        return Ok(Bytes::from(data.clone()));
    }
    if let Some(path) = &args.file {
        return fs::read(path)
            .map(Bytes::from)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), &err));
    }
    Ok(Bytes::new())
}
