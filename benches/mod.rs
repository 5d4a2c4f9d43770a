use std::collections::VecDeque;

use criterion::{BatchSize, Criterion, Throughput, criterion_group, criterion_main};
use libiothub::hub::Credentials;
use libiothub::network::error::Error;
use libiothub::network::mqtt::{Message, MessageHandler, QoS, Session, filter_matches};
use libiothub::network::{Close, Connection, Read, Write};

/// In-memory connection: discards writes, serves a scripted handshake,
/// then reads empty. Keeps the benchmarks free of broker and network
/// noise so they measure the packet encoding alone.
struct SinkConnection {
    inbound: VecDeque<u8>,
}

impl SinkConnection {
    fn with_connack() -> Self {
        Self {
            inbound: VecDeque::from([0x20, 0x02, 0x00, 0x00]),
        }
    }
}

impl Read for SinkConnection {
    type Error = Error;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let len = buf.len().min(self.inbound.len());
        for slot in buf.iter_mut().take(len) {
            *slot = self.inbound.pop_front().unwrap();
        }
        Ok(len)
    }
}

impl Write for SinkConnection {
    type Error = Error;

    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl Close for SinkConnection {
    type Error = Error;

    fn close(self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl Connection for SinkConnection {}

struct DropHandler;

impl MessageHandler for DropHandler {
    fn on_message(&mut self, _topic: &str, _payload: &[u8]) {}
}

fn connected_session() -> Session<SinkConnection, DropHandler> {
    let credentials =
        Credentials::new("contoso.azure-devices.net", "bench-device", "secret").unwrap();
    Session::connect(SinkConnection::with_connack(), &credentials, 240)
        .expect("handshake against scripted connection")
}

pub fn bench_publish(c: &mut Criterion) {
    let payload = b"hello from the benchmark payload";
    let topic = "devices/bench-device/messages/events/";

    let mut group = c.benchmark_group("publish");
    group.throughput(Throughput::Bytes(payload.len() as u64));
    for (name, qos) in [("qos0", QoS::AtMostOnce), ("qos1", QoS::AtLeastOnce)] {
        group.bench_function(name, |b| {
            b.iter_batched_ref(
                connected_session,
                |session| {
                    let message = Message {
                        payload,
                        qos,
                        id: 7,
                        retained: false,
                        duplicate: false,
                    };
                    session.publish(topic, &message).expect("publish");
                },
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

pub fn bench_idle_service(c: &mut Criterion) {
    let mut session = connected_session();
    let mut now_ms = 0u64;

    c.bench_function("idle_service_tick", |b| {
        b.iter(|| {
            now_ms += 100;
            session.service(now_ms).expect("service");
        })
    });
}

pub fn bench_filter_matching(c: &mut Criterion) {
    let filter = "devices/bench-device/messages/devicebound/#";
    let topic = "devices/bench-device/messages/devicebound/commands/reboot";

    c.bench_function("filter_matches", |b| {
        b.iter(|| filter_matches(filter, topic))
    });
}

criterion_group!(
    benches,
    bench_publish,
    bench_idle_service,
    bench_filter_matching
);
criterion_main!(benches);
