//! Throughput Benchmark for FlashBus
//!
//! This benchmark measures request decoding, framing and dispatch
//! under various workloads.

use bytes::{Bytes, BytesMut};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use flashbus::connection::ProtocolHandler;
use flashbus::datastore::{MemoryUnit, RegisterTable, StoreContext, UnitStore};
use flashbus::framer::{ascii, rtu, socket, FramerKind};
use flashbus::protocol::{Request, RequestPdu, ServerDecoder};
use flashbus::server::ServerContext;
use std::sync::Arc;
use std::time::Duration;

fn read_holding(tid: u16) -> Request {
    Request::new(
        tid,
        1,
        RequestPdu::ReadHoldingRegisters {
            address: 0,
            count: 10,
        },
    )
}

fn write_registers(tid: u16) -> Request {
    Request::new(
        tid,
        1,
        RequestPdu::WriteMultipleRegisters {
            address: 0,
            values: (0..100).collect(),
        },
    )
}

fn context(framer: FramerKind) -> ServerContext {
    let store = StoreContext::new().with_unit(1, MemoryUnit::with_size(1000));
    ServerContext::with_store(Arc::new(store)).with_framer(framer)
}

/// Benchmark PDU decoding
fn bench_decode(c: &mut Criterion) {
    let decoder = ServerDecoder::new();
    let read = read_holding(0).pdu.encode();
    let write = write_registers(0).pdu.encode();

    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Elements(1));

    group.bench_function("read_holding_registers", |b| {
        b.iter(|| black_box(decoder.decode(black_box(&read))));
    });

    group.bench_function("write_100_registers", |b| {
        b.iter(|| black_box(decoder.decode(black_box(&write))));
    });

    group.finish();
}

/// Benchmark framing of a pipelined chunk of 100 requests
fn bench_framers(c: &mut Criterion) {
    let requests: Vec<Request> = (0..100).map(read_holding).collect();

    let mut group = c.benchmark_group("framer");
    group.throughput(Throughput::Elements(requests.len() as u64));

    let framings: [(FramerKind, fn(&Request) -> Bytes); 3] = [
        (FramerKind::Socket, socket::encode_request),
        (FramerKind::Rtu, rtu::encode_request),
        (FramerKind::Ascii, ascii::encode_request),
    ];

    for (kind, encode) in framings {
        let chunk: Vec<u8> = requests.iter().flat_map(|r| encode(r).to_vec()).collect();
        let mut framer = kind.build(ServerDecoder::new());

        group.bench_function(kind.to_string(), |b| {
            b.iter(|| {
                let mut count = 0;
                framer.process_incoming_packet(black_box(&chunk), &mut |_| count += 1);
                black_box(count)
            });
        });
    }

    group.finish();
}

/// Benchmark full dispatch: bytes in, response bytes out
fn bench_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch");
    group.throughput(Throughput::Elements(1));

    let ctx = context(FramerKind::Socket);
    let mut handler = ctx.new_handler("bench");
    handler.on_open();

    let read = socket::encode_request(&read_holding(1));
    group.bench_function("read_10_registers", |b| {
        let mut out = BytesMut::with_capacity(4096);
        b.iter(|| {
            handler.on_data(black_box(&read), &mut out);
            out.clear();
        });
    });

    let write = socket::encode_request(&write_registers(1));
    group.bench_function("write_100_registers", |b| {
        let mut out = BytesMut::with_capacity(4096);
        b.iter(|| {
            handler.on_data(black_box(&write), &mut out);
            out.clear();
        });
    });

    let missing = socket::encode_request(&Request::new(
        1,
        9,
        RequestPdu::ReadCoils {
            address: 0,
            count: 1,
        },
    ));
    group.bench_function("unknown_unit", |b| {
        let mut out = BytesMut::with_capacity(4096);
        b.iter(|| {
            handler.on_data(black_box(&missing), &mut out);
            out.clear();
        });
    });

    group.finish();
}

/// Benchmark concurrent access to one unit
fn bench_concurrent(c: &mut Criterion) {
    use std::thread;

    let mut group = c.benchmark_group("concurrent");
    group.measurement_time(Duration::from_secs(10));

    group.bench_function("4_threads_mixed", |b| {
        b.iter(|| {
            let unit = Arc::new(MemoryUnit::with_size(1000));
            let handles: Vec<_> = (0..4u16)
                .map(|t| {
                    let unit = Arc::clone(&unit);
                    thread::spawn(move || {
                        for i in 0..10_000u16 {
                            let address = (t * 250) + (i % 240);
                            let _ = unit.write_registers(
                                RegisterTable::HoldingRegisters,
                                address,
                                &[i; 10],
                            );
                            let _ = unit.read_registers(
                                RegisterTable::HoldingRegisters,
                                address,
                                10,
                            );
                        }
                    })
                })
                .collect();

            for handle in handles {
                handle.join().unwrap();
            }

            black_box(unit.stats());
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_decode,
    bench_framers,
    bench_dispatch,
    bench_concurrent,
);

criterion_main!(benches);
