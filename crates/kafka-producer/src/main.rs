use kafka_tail_producer::{publish_test_lines, KafkaTestProducer};

/// Publishes test log lines for a local kafka-tail run.
///
/// 1. Start Kafka with Docker:
///    docker run -d --name kafka -p 9092:9092 apache/kafka:latest
/// 2. Run the producer:
///    cargo run -p kafka-tail-producer -- app-logs 20
/// 3. Tail it in another terminal:
///    kafka-tail run --config kafka-tail.yaml
#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    match run_main().await {
        Ok(_) => println!("Producer finished successfully"),
        Err(e) => {
            eprintln!("Error: {e:?}");
            std::process::exit(1);
        }
    }
}

async fn run_main() -> anyhow::Result<()> {
    let broker = std::env::var("KAFKA_BROKER").unwrap_or_else(|_| "localhost:9092".to_string());
    let mut args = std::env::args().skip(1);
    let topic = args.next().unwrap_or_else(|| "app-logs".to_string());
    let count: usize = match args.next() {
        Some(count) => count.parse()?,
        None => 10,
    };

    let producer = KafkaTestProducer::new(&broker).await?;
    producer.create_topic_if_not_exists(&topic, 3).await?;
    publish_test_lines(&producer, &topic, count).await?;

    println!("Published {count} lines to '{topic}'");
    Ok(())
}
