// tests/engine_tests.rs
use classify_worker::cache::MemoryCache;
use classify_worker::classify::engine::ClassifyEngine;
use classify_worker::classify::{ClassifyError, TextClassifier};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn labels(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

// Instrumented classifier: counts invocations and records how many run at
// the same instant.
struct CountingClassifier {
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    delay: Duration,
}

impl CountingClassifier {
    fn new(delay: Duration) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            delay,
        }
    }
}

impl TextClassifier for CountingClassifier {
    fn classify(&self, _text: &str, labels: &[String]) -> Result<Vec<f64>, ClassifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        std::thread::sleep(self.delay);

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        let share = 1.0 / labels.len() as f64;
        Ok(vec![share; labels.len()])
    }
}

// Fails on the first call, succeeds afterwards.
struct FlakyClassifier {
    calls: AtomicUsize,
}

impl TextClassifier for FlakyClassifier {
    fn classify(&self, _text: &str, labels: &[String]) -> Result<Vec<f64>, ClassifyError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(ClassifyError::Backend("model exploded".into()));
        }
        Ok(vec![0.0; labels.len()])
    }
}

// Returns the wrong number of scores.
struct RaggedClassifier;

impl TextClassifier for RaggedClassifier {
    fn classify(&self, _text: &str, _labels: &[String]) -> Result<Vec<f64>, ClassifyError> {
        Ok(vec![1.0])
    }
}

fn engine_with(classifier: Arc<dyn TextClassifier>) -> ClassifyEngine {
    ClassifyEngine::new(classifier, Arc::new(MemoryCache::new()))
}

#[tokio::test]
async fn repeated_request_is_served_from_cache() {
    let classifier = Arc::new(CountingClassifier::new(Duration::ZERO));
    let engine = engine_with(classifier.clone());
    let labels = labels(&["sports", "science"]);

    let first = engine.classify("hello", &labels).await.unwrap();
    assert!(!first.cache_hit);

    let second = engine.classify("hello", &labels).await.unwrap();
    assert!(second.cache_hit);
    assert_eq!(first.result, second.result);

    assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn result_keeps_requested_label_order() {
    let classifier = Arc::new(CountingClassifier::new(Duration::ZERO));
    let engine = engine_with(classifier);
    let labels = labels(&["b", "a", "c"]);

    let outcome = engine.classify("hello", &labels).await.unwrap();
    assert_eq!(outcome.result.sequence, "hello");
    assert_eq!(outcome.result.labels, labels);
    assert_eq!(outcome.result.scores.len(), labels.len());
}

#[tokio::test]
async fn reordered_labels_are_a_distinct_request() {
    let classifier = Arc::new(CountingClassifier::new(Duration::ZERO));
    let engine = engine_with(classifier.clone());

    engine
        .classify("hello", &labels(&["a", "b"]))
        .await
        .unwrap();
    let reordered = engine
        .classify("hello", &labels(&["b", "a"]))
        .await
        .unwrap();

    assert!(!reordered.cache_hit);
    assert_eq!(classifier.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_misses_never_overlap() {
    let classifier = Arc::new(CountingClassifier::new(Duration::from_millis(20)));
    let engine = Arc::new(engine_with(classifier.clone()));

    let mut handles = Vec::new();
    for i in 0..8 {
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            engine
                .classify(&format!("message {}", i), &labels(&["a", "b"]))
                .await
                .unwrap()
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(classifier.calls.load(Ordering::SeqCst), 8);
    assert_eq!(
        classifier.max_in_flight.load(Ordering::SeqCst),
        1,
        "gate must keep classifier invocations exclusive"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_identical_requests_compute_once() {
    let classifier = Arc::new(CountingClassifier::new(Duration::from_millis(20)));
    let engine = Arc::new(engine_with(classifier.clone()));

    let mut handles = Vec::new();
    for _ in 0..4 {
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            engine
                .classify("same message", &labels(&["a", "b"]))
                .await
                .unwrap()
        }));
    }

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap().result);
    }

    // Followers that waited on the gate serve the stored result
    assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);
    assert!(results.windows(2).all(|pair| pair[0] == pair[1]));
}

#[tokio::test]
async fn gate_is_released_after_classifier_failure() {
    let engine = engine_with(Arc::new(FlakyClassifier {
        calls: AtomicUsize::new(0),
    }));
    let labels = labels(&["a"]);

    let first = engine.classify("hello", &labels).await;
    assert!(matches!(first, Err(ClassifyError::Backend(_))));

    // A failed computation must not leave the gate held
    let second = engine.classify("hello", &labels).await.unwrap();
    assert!(!second.cache_hit);
}

#[tokio::test]
async fn failures_are_not_cached() {
    let classifier = Arc::new(FlakyClassifier {
        calls: AtomicUsize::new(0),
    });
    let engine = engine_with(classifier.clone());
    let labels = labels(&["a"]);

    assert!(engine.classify("hello", &labels).await.is_err());
    assert!(engine.classify("hello", &labels).await.is_ok());
    assert_eq!(classifier.calls.load(Ordering::SeqCst), 2);

    // Third request hits the entry stored by the successful second call
    let third = engine.classify("hello", &labels).await.unwrap();
    assert!(third.cache_hit);
    assert_eq!(classifier.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn mismatched_score_count_is_a_backend_error() {
    let engine = engine_with(Arc::new(RaggedClassifier));
    let err = engine
        .classify("hello", &labels(&["a", "b"]))
        .await
        .unwrap_err();
    assert!(matches!(err, ClassifyError::Backend(_)));
}

#[tokio::test]
async fn empty_inputs_are_rejected() {
    let engine = engine_with(Arc::new(CountingClassifier::new(Duration::ZERO)));

    let err = engine.classify("", &labels(&["a"])).await.unwrap_err();
    assert!(matches!(err, ClassifyError::InvalidInput(_)));

    let err = engine.classify("hello", &[]).await.unwrap_err();
    assert!(matches!(err, ClassifyError::InvalidInput(_)));
}
