//! Declares the queue topology idempotently at startup: a fanout
//! dead-letter exchange, a durable DLQ bound to it, and the durable main
//! queue with `x-dead-letter-exchange` pointed at the DLX.

use lapin::options::{
    BasicQosOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::{AMQPValue, FieldTable};
use lapin::{Channel, ExchangeKind};

pub const DLX_EXCHANGE: &str = "urls_dlx";
pub const DLQ_QUEUE: &str = "urls_dlq";
pub const MAIN_QUEUE: &str = "urls_queue";
const PREFETCH_COUNT: u16 = 1;

pub async fn declare(channel: &Channel) -> lapin::Result<()> {
    channel
        .exchange_declare(
            DLX_EXCHANGE,
            ExchangeKind::Fanout,
            ExchangeDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await?;

    channel
        .queue_declare(
            DLQ_QUEUE,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await?;

    channel
        .queue_bind(
            DLQ_QUEUE,
            DLX_EXCHANGE,
            "",
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await?;

    let mut main_queue_args = FieldTable::default();
    main_queue_args.insert(
        "x-dead-letter-exchange".into(),
        AMQPValue::LongString(DLX_EXCHANGE.into()),
    );

    channel
        .queue_declare(
            MAIN_QUEUE,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            main_queue_args,
        )
        .await?;

    channel
        .basic_qos(PREFETCH_COUNT, BasicQosOptions::default())
        .await?;

    Ok(())
}
