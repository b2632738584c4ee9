use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};
use std::time::Duration;

use async_trait::async_trait;
use docsum::{
    config::SizeUnit,
    processing::{
        Chunker, PARAGRAPH_SEPARATOR, PipelineError, QueryError, QuerySettings, SummaryPipeline,
        chunking::split_paragraphs,
    },
    summarization::{SummarizationClient, SummarizationClientError, SummarizationRequest},
};

type Responder = dyn Fn(&str) -> Result<String, SummarizationClientError> + Send + Sync;

/// Test double answering every request through a closure and logging the texts it saw.
struct FnClient {
    respond: Box<Responder>,
    calls: Arc<AtomicUsize>,
    seen: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl SummarizationClient for FnClient {
    async fn generate_summary(
        &self,
        request: SummarizationRequest,
    ) -> Result<String, SummarizationClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(request.text.clone());
        (self.respond)(&request.text)
    }
}

struct Harness {
    pipeline: SummaryPipeline,
    calls: Arc<AtomicUsize>,
    seen: Arc<Mutex<Vec<String>>>,
}

fn settings(max_chunk_size: usize) -> QuerySettings {
    QuerySettings {
        model: "test-model".into(),
        instruction: "Summarize the input text below.".into(),
        max_chunk_size,
        retry_limit: 3,
        retry_delay: Duration::from_millis(1),
        max_retry_delay: Duration::from_millis(5),
        max_split_depth: 8,
    }
}

fn harness<F>(max_chunk_size: usize, respond: F) -> Harness
where
    F: Fn(&str) -> Result<String, SummarizationClientError> + Send + Sync + 'static,
{
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let client = FnClient {
        respond: Box::new(respond),
        calls: calls.clone(),
        seen: seen.clone(),
    };
    let pipeline = SummaryPipeline::new(
        Box::new(client),
        Chunker::new(SizeUnit::Characters).expect("chunker"),
        settings(max_chunk_size),
    );
    Harness {
        pipeline,
        calls,
        seen,
    }
}

fn echo(text: &str) -> Result<String, SummarizationClientError> {
    Ok(text.to_string())
}

fn rejected() -> SummarizationClientError {
    SummarizationClientError::Rejected("Request too large for model".into())
}

fn document(paragraphs: usize, width: usize) -> String {
    (0..paragraphs)
        .map(|index| {
            let word = format!("p{index:03}");
            let mut paragraph = word.clone();
            while paragraph.len() + word.len() < width {
                paragraph.push(' ');
                paragraph.push_str(&word);
            }
            paragraph
        })
        .collect::<Vec<_>>()
        .join("\n\n\n")
}

#[tokio::test]
async fn echo_summarizer_preserves_document_order() {
    let text = document(12, 60);
    let harness = harness(150, echo);

    let summary = harness
        .pipeline
        .summarize_document(&text)
        .await
        .expect("summary");

    let expected = split_paragraphs(&text)
        .collect::<Vec<_>>()
        .join(PARAGRAPH_SEPARATOR);
    assert_eq!(summary, expected);
}

#[tokio::test]
async fn every_chunk_contributes_one_summary_in_order() {
    let text = document(6, 40);
    let harness = harness(100, |text| {
        Ok(text.split_whitespace().next().unwrap_or("").to_string())
    });

    let summary = harness
        .pipeline
        .summarize_document(&text)
        .await
        .expect("summary");

    let seen = harness.seen.lock().unwrap().clone();
    // Two paragraphs fit per 100-character chunk.
    assert_eq!(seen.len(), 4);
    assert_eq!(seen[3], "p000\n\np002\n\np004");
    assert_eq!(summary, "p000");
    assert_eq!(harness.pipeline.metrics_snapshot().chunks, 3);
}

#[tokio::test]
async fn always_transient_summarizer_fails_after_retry_limit() {
    let harness = harness(1000, |_| {
        Err(SummarizationClientError::Transient(
            "internal server error".into(),
        ))
    });

    let error = harness
        .pipeline
        .summarize_document("A short document.")
        .await
        .unwrap_err();

    assert!(matches!(
        error,
        PipelineError::Query(QueryError::RetriesExhausted { attempts: 3, .. })
    ));
    assert_eq!(error.exit_code(), 4);
    assert_eq!(harness.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn size_limited_summarizer_succeeds_on_large_document() {
    const LIMIT: usize = 200;
    let text = document(60, 150);
    let harness = harness(1000, |text| {
        if text.chars().count() > LIMIT {
            Err(rejected())
        } else {
            Ok(text.split_whitespace().next().unwrap_or("").to_string())
        }
    });

    let summary = harness
        .pipeline
        .summarize_document(&text)
        .await
        .expect("summary");

    assert_eq!(summary, "p000");
    let snapshot = harness.pipeline.metrics_snapshot();
    assert!(snapshot.subdivisions > 0);
    assert_eq!(
        snapshot.remote_calls,
        harness.calls.load(Ordering::SeqCst) as u64
    );
    for text in harness.seen.lock().unwrap().iter() {
        assert!(!text.is_empty());
    }
}

#[tokio::test]
async fn tiny_service_limit_succeeds_despite_many_halvings() {
    // 4000 / 10 needs far more than eight halvings of the subdivision bound.
    let text = vec!["aaaaa"; 2000].join(PARAGRAPH_SEPARATOR);
    let harness = harness(4000, |text| {
        if text.chars().count() > 10 {
            Err(rejected())
        } else {
            Ok("a".to_string())
        }
    });

    let summary = harness
        .pipeline
        .summarize_document(&text)
        .await
        .expect("summary");

    assert_eq!(summary, "a");
    for text in harness.seen.lock().unwrap().iter() {
        assert!(!text.is_empty());
    }
}

#[tokio::test]
async fn three_paragraph_document_is_summarized_as_three_chunks() {
    let text = ["a".repeat(2000), "b".repeat(2000), "c".repeat(2000)].join("\n\n");
    let harness = harness(3000, |text| Ok(text.chars().take(3).collect()));

    let summary = harness
        .pipeline
        .summarize_document(&text)
        .await
        .expect("summary");

    let seen = harness.seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 4);
    assert_eq!(seen[0], "a".repeat(2000));
    assert_eq!(seen[1], "b".repeat(2000));
    assert_eq!(seen[2], "c".repeat(2000));
    assert_eq!(seen[3], "aaa\n\nbbb\n\nccc");
    assert_eq!(summary, "aaa");
}

#[tokio::test]
async fn irreducible_paragraph_is_an_unrecoverable_failure() {
    let text = "x".repeat(10_000);
    let harness = harness(100, |text| {
        if text.chars().count() > 50 {
            Err(rejected())
        } else {
            echo(text)
        }
    });

    let error = harness
        .pipeline
        .summarize_document(&text)
        .await
        .unwrap_err();

    assert!(matches!(
        error,
        PipelineError::Query(QueryError::Oversized { size: 10_000, .. })
    ));
    assert_eq!(error.exit_code(), 3);
    assert_eq!(harness.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn blank_document_is_rejected_before_any_call() {
    let harness = harness(100, echo);
    let error = harness
        .pipeline
        .summarize_document("\n\n  \n\n")
        .await
        .unwrap_err();
    assert!(matches!(error, PipelineError::EmptyDocument));
    assert_eq!(harness.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn reduce_rechunks_oversized_summary_sets() {
    let harness = harness(20, |text| {
        Ok(text.split_whitespace().next().unwrap_or("").to_string())
    });
    let summaries = vec![
        "alpha one two".to_string(),
        "beta three four".to_string(),
        "gamma five six".to_string(),
    ];

    let summary = harness.pipeline.reduce(summaries).await.expect("summary");

    assert_eq!(
        *harness.seen.lock().unwrap(),
        vec![
            "alpha one two",
            "beta three four",
            "gamma five six",
            "alpha\n\nbeta\n\ngamma",
        ]
    );
    assert_eq!(summary, "alpha");
}

#[tokio::test]
async fn reduce_without_summaries_is_an_error() {
    let harness = harness(20, echo);
    let error = harness.pipeline.reduce(Vec::new()).await.unwrap_err();
    assert!(matches!(error, PipelineError::EmptyDocument));
}

#[tokio::test]
async fn missing_file_fails_extraction() {
    let harness = harness(100, echo);
    let error = harness
        .pipeline
        .summarize_file(std::path::Path::new("/nonexistent/docsum/input.txt"))
        .await
        .unwrap_err();
    assert!(matches!(error, PipelineError::Extraction(_)));
    assert_eq!(error.exit_code(), 2);
}
