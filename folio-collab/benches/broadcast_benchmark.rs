use criterion::{black_box, criterion_group, criterion_main, Criterion};
use folio_collab::protocol::EditEvent;
use folio_collab::registry::{SessionHandle, SessionRegistry};
use folio_collab::storage::{RocksStore, StoreConfig};
use folio_core::{BlockData, BlockStore, ContentBlock};
use serde_json::json;
use std::sync::Arc;

const EDIT: &str = r#"{"documentId":"d1","actorId":4,"kind":"block-edit",
    "block":{"id":"0b6f1c2e-7f43-4a55-9a43-0c7d2f1e9b11","type":"paragraph","data":{"text":"hello"}}}"#;

fn bench_parse_edit_event(c: &mut Criterion) {
    c.bench_function("parse_edit_event", |b| {
        b.iter(|| black_box(EditEvent::parse(black_box(EDIT)).unwrap()))
    });
}

fn bench_broadcast_100_sessions(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let registry = SessionRegistry::new();
    let mut receivers = Vec::new();
    rt.block_on(async {
        for _ in 0..100 {
            let (session, rx) = SessionHandle::channel(4096);
            registry.subscribe("doc", &session).await;
            receivers.push(rx);
        }
    });
    let payload: Arc<str> = Arc::from(EDIT);

    c.bench_function("broadcast_100_sessions", |b| {
        b.iter(|| {
            rt.block_on(async {
                let report = registry.broadcast("doc", payload.clone(), None).await;
                black_box(report);
            });
            for rx in receivers.iter_mut() {
                while rx.try_recv().is_ok() {}
            }
        })
    });
}

fn bench_rocks_save_block(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let store = RocksStore::open(StoreConfig::for_testing(dir.path())).unwrap();
    let mut data = BlockData::new();
    data.insert("text".into(), json!("x".repeat(512)));
    let block = ContentBlock::new("bench-block", "paragraph", data);

    c.bench_function("rocks_save_block_512B", |b| {
        b.iter(|| store.save_block(black_box(&block)).unwrap())
    });
}

fn bench_rocks_get_block(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let store = RocksStore::open(StoreConfig::for_testing(dir.path())).unwrap();
    let mut data = BlockData::new();
    data.insert("text".into(), json!("x".repeat(512)));
    store
        .save_block(&ContentBlock::new("bench-block", "paragraph", data))
        .unwrap();

    c.bench_function("rocks_get_block_512B", |b| {
        b.iter(|| black_box(store.get_block(black_box("bench-block")).unwrap()))
    });
}

criterion_group!(
    benches,
    bench_parse_edit_event,
    bench_broadcast_100_sessions,
    bench_rocks_save_block,
    bench_rocks_get_block,
);
criterion_main!(benches);
