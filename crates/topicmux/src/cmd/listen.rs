use bytes::Bytes;
use tokio::sync::mpsc;
use topicmux_conn::{MuxConfig, MuxListener, OverflowPolicy, Subscription, Topic, TopicConfig};
use tracing::{info, warn};

use crate::cmd::{parse_duration, ListenArgs, SerializerKind};
use crate::exit::{conn_error, CliResult, SUCCESS};
use crate::output::{print_message, OutputFormat};

pub async fn run(
    args: ListenArgs,
    format: OutputFormat,
    serializer: SerializerKind,
) -> CliResult<i32> {
    let mut config = MuxConfig::default();
    if let Some(deadline) = &args.read_deadline {
        config = config
            .with_read_deadline(parse_duration(deadline)?)
            .with_refresh_read_deadline(args.idle);
    }
    let topic_config = TopicConfig {
        capacity: args.capacity,
        overflow: if args.drop_when_full {
            OverflowPolicy::DropNewest
        } else {
            OverflowPolicy::Block
        },
    };

    let listener = MuxListener::bind(&args.endpoint, serializer.build())
        .await
        .map_err(|err| conn_error("bind failed", err))?
        .with_config(config);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut printed = 0usize;

    loop {
        let topics: Vec<Topic> = args
            .topics
            .iter()
            .map(|name| Topic::with_config(name.clone(), topic_config))
            .collect();
        let subscriptions: Vec<Subscription> = topics.iter().map(Topic::subscribe).collect();

        let conn = tokio::select! {
            accepted = listener.accept_with_topics(topics) => {
                accepted.map_err(|err| conn_error("accept failed", err))?
            }
            _ = &mut shutdown => return Ok(SUCCESS),
        };

        let mut inbox = merge(subscriptions);
        loop {
            let next = tokio::select! {
                next = inbox.recv() => next,
                _ = &mut shutdown => {
                    let _ = conn.close().await;
                    return Ok(SUCCESS);
                }
            };
            // All subscriptions end once the connection has closed.
            let Some((topic, body)) = next else {
                break;
            };

            print_message(&topic, &body, conn.id(), format);
            printed = printed.saturating_add(1);

            if let Some(count) = args.count {
                if printed >= count {
                    conn.close()
                        .await
                        .map_err(|err| conn_error("close failed", err))?;
                    return Ok(SUCCESS);
                }
            }
        }

        let reason = conn.closed().await;
        if reason.is_abnormal() {
            warn!(conn = conn.id(), %reason, "connection ended");
        } else {
            info!(conn = conn.id(), %reason, "connection ended");
        }
        conn.close()
            .await
            .map_err(|err| conn_error("close failed", err))?;
    }
}

/// Forward every subscription into one queue tagged with its topic name.
fn merge(subscriptions: Vec<Subscription>) -> mpsc::Receiver<(String, Bytes)> {
    let (tx, rx) = mpsc::channel(64);
    for mut subscription in subscriptions {
        let tx = tx.clone();
        tokio::spawn(async move {
            while let Some(body) = subscription.recv().await {
                let item = (subscription.topic().to_string(), body);
                if tx.send(item).await.is_err() {
                    break;
                }
            }
        });
    }
    rx
}
