use anyhow::Result;
use async_trait::async_trait;
use extract::{Conversation, Extractor, TextGenerator, prompt};
use index::{GraphStore, IndexOptions, Indexer, MemoryGraphStore};
use query::{DiscoveryOptions, PatternDiscovery};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Answers extraction prompts with the worked example and question prompts
/// with a fixed question, or an error when `questions_fail` is set.
struct FakeModel {
    questions_fail: bool,
    question_calls: AtomicUsize,
}

impl FakeModel {
    fn new(questions_fail: bool) -> Arc<Self> {
        Arc::new(Self {
            questions_fail,
            question_calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl TextGenerator for FakeModel {
    async fn complete(&self, conversation: &Conversation) -> Result<String> {
        if conversation.messages[0].content == prompt::SYSTEM_MESSAGE {
            return Ok(prompt::EXAMPLE_OUTPUT.to_string());
        }
        self.question_calls.fetch_add(1, Ordering::SeqCst);
        if self.questions_fail {
            anyhow::bail!("quota exceeded");
        }
        Ok("\"Has blood accumulation spinal veins associated with paralysis?\"\n".to_string())
    }
}

async fn ingest_ollivier(model: Arc<FakeModel>) -> Arc<MemoryGraphStore> {
    let store = Arc::new(MemoryGraphStore::new());
    let indexer = Indexer::new(Extractor::new(model), store.clone());
    indexer
        .index_text(prompt::EXAMPLE_CONTENT, "ollivier", &IndexOptions::default())
        .await
        .unwrap();
    store
}

#[tokio::test]
async fn ollivier_text_becomes_graph_and_questions() {
    let model = FakeModel::new(false);
    let store = ingest_ollivier(model.clone()).await;

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.total_nodes, 6);
    assert_eq!(stats.total_relationships, 5);
    assert_eq!(stats.relationship_types["co_occurs_with"], 2);

    let discovery = PatternDiscovery::new(store.clone(), model.clone());
    let discovered = discovery.discover(&DiscoveryOptions::default()).await.unwrap();

    // Four single-edge patterns plus three two-edge chains through the
    // paralysis node; the length-three candidates under the cap never match.
    assert_eq!(discovered.len(), 7);
    assert_eq!(model.question_calls.load(Ordering::SeqCst), 7);

    let first = &discovered[0];
    assert_eq!(first.pattern.relationships(), ["associated_with"]);
    assert_eq!(first.example_path.steps[0].from, "blood_accumulation_spinal_veins");
    assert_eq!(first.example_path.steps[0].to, "paralysis_spinal_blood_congestion");
    assert_eq!(first.question, "Has blood accumulation spinal veins associated with paralysis?");

    let co_occurs = discovered
        .iter()
        .find(|d| d.pattern.relationships() == ["co_occurs_with"])
        .unwrap();
    assert_eq!(co_occurs.num_paths, 2);

    let chains: Vec<String> = discovered
        .iter()
        .filter(|d| d.pattern.len() == 2)
        .map(|d| d.pattern.to_string())
        .collect();
    assert_eq!(
        chains,
        vec![
            "associated_with -> co_occurs_with",
            "associated_with -> described_in",
            "associated_with -> results_in",
        ]
    );
}

#[tokio::test]
async fn patterns_without_questions_are_dropped() {
    let model = FakeModel::new(true);
    let store = ingest_ollivier(model.clone()).await;

    let discovery = PatternDiscovery::new(store, model.clone());
    let discovered = discovery.discover(&DiscoveryOptions::default()).await.unwrap();

    assert!(discovered.is_empty());
    assert_eq!(model.question_calls.load(Ordering::SeqCst), 7);
}

#[tokio::test]
async fn max_length_limits_chain_size() {
    let model = FakeModel::new(false);
    let store = ingest_ollivier(model.clone()).await;

    let options = DiscoveryOptions {
        max_length: 1,
        ..DiscoveryOptions::default()
    };
    let discovered = PatternDiscovery::new(store, model).discover(&options).await.unwrap();

    assert_eq!(discovered.len(), 4);
    assert!(discovered.iter().all(|d| d.pattern.len() == 1));
}

#[tokio::test]
async fn empty_graph_discovers_nothing() {
    let model = FakeModel::new(false);
    let store = Arc::new(MemoryGraphStore::new());

    let discovered = PatternDiscovery::new(store, model.clone())
        .discover(&DiscoveryOptions::default())
        .await
        .unwrap();

    assert!(discovered.is_empty());
    assert_eq!(model.question_calls.load(Ordering::SeqCst), 0);
}
