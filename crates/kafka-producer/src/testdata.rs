//! Test log lines for Kafka integration tests

use crate::KafkaTestProducer;

const LEVELS: [&str; 4] = ["debug", "info", "warn", "error"];
const HOSTS: [&str; 3] = ["web-1", "web-2", "worker-1"];

/// The `n`th test line, in logfmt.
pub fn test_line(n: usize) -> String {
    format!(
        "level={} host={} seq={} msg=\"request handled\"",
        LEVELS[n % LEVELS.len()],
        HOSTS[n % HOSTS.len()],
        n
    )
}

/// Publish `count` test lines keyed by host.
pub async fn publish_test_lines(
    producer: &KafkaTestProducer,
    topic: &str,
    count: usize,
) -> anyhow::Result<()> {
    for n in 0..count {
        producer
            .publish_line(topic, Some(HOSTS[n % HOSTS.len()]), &test_line(n))
            .await?;
    }
    tracing::debug!("Published {} test lines to {}", count, topic);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_format() {
        assert_eq!(
            test_line(0),
            "level=debug host=web-1 seq=0 msg=\"request handled\""
        );
        assert_eq!(
            test_line(5),
            "level=info host=worker-1 seq=5 msg=\"request handled\""
        );
    }

    #[test]
    fn test_lines_are_unique() {
        let lines: std::collections::HashSet<String> = (0..100).map(test_line).collect();
        assert_eq!(lines.len(), 100);
    }
}
