//! Property tests for pagination, erasure and batching.

use aws_bulk::mocks::{InMemoryObjectStore, InMemoryQueue, QueueOp};
use aws_bulk::pagination::paginate;
use aws_bulk::services::{BatchDispatcher, BulkEraser, StorageService};
use aws_bulk::types::{clamp_max_messages, Cursor, Page};
use aws_bulk::{BulkConfig, BulkError};
use futures::TryStreamExt;
use proptest::prelude::*;
use std::sync::Arc;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #[test]
    fn paginate_visits_every_item_once(total in 0usize..200, page_size in 1usize..25) {
        let items: Vec<usize> = (0..total).collect();
        let collected: Vec<usize> = runtime().block_on(async {
            let source = &items;
            paginate("ListNumbers", move |cursor: Option<Cursor>| async move {
                let start = cursor.map_or(0, |c| c.marker.parse::<usize>().unwrap());
                let end = (start + page_size).min(source.len());
                let page = source[start..end].to_vec();
                Ok::<_, BulkError>(if end < source.len() {
                    Page::more(page, Cursor::new(end.to_string()))
                } else {
                    Page::last(page)
                })
            })
            .try_collect()
            .await
        }).unwrap();
        prop_assert_eq!(collected, items);
    }

    #[test]
    fn eraser_leaves_nothing_behind(
        keys in 0usize..30,
        versions_per_key in 1usize..4,
        page_size in 1u32..8,
        versioned in any::<bool>(),
    ) {
        let store = Arc::new(InMemoryObjectStore::new().with_page_size(page_size));
        store.create_container("bucket", versioned);
        for k in 0..keys {
            for v in 0..versions_per_key {
                store.insert_object("bucket", &format!("key-{k:03}"), format!("v{v}"));
            }
        }

        let storage = StorageService::new(Arc::new(BulkConfig::default()), store.clone());
        let report = runtime()
            .block_on(BulkEraser::new(storage).empty_container("bucket"))
            .unwrap();

        prop_assert_eq!(store.object_count("bucket"), 0);
        prop_assert_eq!(store.version_count("bucket"), 0);
        prop_assert_eq!(report.objects_deleted, keys as u64);
        if versioned {
            // every stored version plus one delete marker per key
            prop_assert_eq!(report.versions_deleted, (keys * (versions_per_key + 1)) as u64);
        } else {
            prop_assert_eq!(report.versions_deleted, 0);
        }
    }

    #[test]
    fn dispatcher_chunks_in_order(n in 0usize..120) {
        let url = "https://sqs.us-east-1.amazonaws.com/123456789012/prop";
        let queue = Arc::new(InMemoryQueue::new());
        queue.create_queue(url);
        let bodies: Vec<String> = (0..n).map(|i| format!("body-{i}")).collect();

        let failures = runtime()
            .block_on(BatchDispatcher::new(queue.clone()).send_bulk(url, &bodies))
            .unwrap();

        prop_assert!(failures.is_empty());
        prop_assert_eq!(queue.calls(QueueOp::SendMessageBatch), n.div_ceil(10));
        let batches = queue.batch_calls();
        prop_assert!(batches.iter().all(|b| !b.is_empty() && b.len() <= 10));
        let sent: Vec<String> = batches.into_iter().flatten().map(|e| e.body).collect();
        prop_assert_eq!(sent, bodies);
    }

    #[test]
    fn clamped_receive_size_is_in_range(n in any::<u32>()) {
        let clamped = clamp_max_messages(n);
        prop_assert!((1..=10).contains(&clamped));
        if (1..=10).contains(&n) {
            prop_assert_eq!(clamped, n);
        }
    }
}
