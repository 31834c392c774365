//! Benchmark utilities.

use bytes::Bytes;
use docrepl_protocol::{ChangeVector, Document, DocumentRecord, NodeId, Tombstone, TombstoneRecord};
use docrepl_storage::{MemoryChangeStore, WriteBatch};
use rand::Rng;

/// Generate random payload bytes of the specified size.
pub fn random_data(size: usize) -> Bytes {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen::<u8>()).collect::<Vec<_>>().into()
}

/// Generate interleaved document and tombstone scans.
///
/// Every third etag is a tombstone; the rest are documents of
/// `payload_size` bytes. Each write is its own transaction.
pub fn generate_history(
    count: usize,
    payload_size: usize,
) -> (Vec<DocumentRecord>, Vec<TombstoneRecord>) {
    let node = NodeId::new();
    let payload = random_data(payload_size);
    let mut documents = Vec::new();
    let mut tombstones = Vec::new();
    for i in 0..count {
        let etag = i as u64 + 1;
        let mut change_vector = ChangeVector::new();
        change_vector.observe(node, etag);
        let key = Bytes::from(format!("docs/{i}"));
        let transaction_marker = (i % i16::MAX as usize) as i16;
        if i % 3 == 2 {
            tombstones.push(Tombstone {
                etag,
                change_vector,
                transaction_marker,
                key,
                collection: Bytes::from_static(b"Docs"),
            });
        } else {
            documents.push(Document {
                etag,
                change_vector,
                transaction_marker,
                key,
                data: payload.clone(),
            });
        }
    }
    (documents, tombstones)
}

/// Fill a store with `transactions` commits of `writes_per_transaction` documents.
pub fn populate_store(
    store: &MemoryChangeStore,
    transactions: usize,
    writes_per_transaction: usize,
    payload_size: usize,
) {
    let payload = random_data(payload_size);
    for tx in 0..transactions {
        let mut batch = WriteBatch::new();
        for n in 0..writes_per_transaction {
            batch.put(format!("docs/{tx}-{n}"), payload.clone());
        }
        store.commit(batch);
    }
}
