mod common;

use common::{harness, paragraphs, TestEmbedder};
use scrivener_vector::{VectorizationQueue, VectorizeOptions};

#[tokio::test]
async fn a_burst_of_edits_runs_once_with_the_newest_content() {
    let h = harness(TestEmbedder::new());
    h.docs.put("doc", "u1", "Draft", &paragraphs(4)).expect("put");
    let queue = VectorizationQueue::new(h.pipeline.clone(), 2);

    for n in 1..=4 { queue.enqueue("doc", paragraphs(n), VectorizeOptions::default()).expect("enqueue"); }
    queue.wait_idle().await;

    let stats = queue.stats();
    assert_eq!(stats.enqueued, 4);
    assert_eq!(stats.superseded, 3);
    assert_eq!(stats.completed, 1);
    assert_eq!(h.pipeline.get_index_state("doc").expect("state").chunk_count, 4);
    assert_eq!(h.embedder.texts(), 4);
}

#[tokio::test]
async fn documents_are_processed_independently() {
    let h = harness(TestEmbedder::new());
    for d in ["a", "b", "c"] { h.docs.put(d, "u1", d, &paragraphs(2)).expect("put"); }
    let queue = VectorizationQueue::new(h.pipeline.clone(), 2);
    for d in ["a", "b", "c"] { queue.enqueue(d, paragraphs(2), VectorizeOptions::default()).expect("enqueue"); }
    queue.wait_idle().await;

    assert_eq!(queue.pending(), 0);
    assert_eq!(queue.stats().completed, 3);
    assert_eq!(h.pipeline.health().indexed, 3);
    assert_eq!(h.vectors.len(), 6);
}

#[tokio::test]
async fn failures_are_counted_and_shutdown_refuses_new_work() {
    let h = harness(TestEmbedder::new());
    let queue = VectorizationQueue::new(h.pipeline.clone(), 1);
    queue.enqueue("unknown", "text".to_string(), VectorizeOptions::default()).expect("enqueue");
    queue.shutdown().await;

    assert_eq!(queue.stats().failed, 1);
    assert!(queue.enqueue("doc", "text".to_string(), VectorizeOptions::default()).is_err());
}
