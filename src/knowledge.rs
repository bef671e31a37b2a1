use std::hash::{Hash, Hasher};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::Result;

/// External knowledge the agent can consult. Implementations return plain
/// text snippets ranked by relevance.
#[async_trait]
pub trait KnowledgeBase: Send + Sync {
    async fn add_document(&self, content: &str, source: Option<&str>) -> Result<()>;

    async fn query(&self, query: &str) -> Result<Vec<String>>;
}

#[derive(Clone, Debug)]
pub struct Document {
    pub id: String,
    pub text: String,
    pub source: Option<String>,
}

#[derive(Clone, Debug)]
pub struct ScoredDocument {
    pub document: Document,
    pub score: f32,
}

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn add(&self, document: Document, embedding: Vec<f32>) -> Result<()>;

    async fn search(&self, embedding: Vec<f32>, top_k: usize) -> Result<Vec<ScoredDocument>>;
}

/// Basic whitespace tokenizer with hashed buckets for deterministic
/// embeddings. Good enough for tests and small corpora.
pub struct WhitespaceEmbedder {
    buckets: usize,
}

impl Default for WhitespaceEmbedder {
    fn default() -> Self {
        Self { buckets: 32 }
    }
}

impl WhitespaceEmbedder {
    pub fn new(buckets: usize) -> Self {
        Self { buckets }
    }
}

#[async_trait]
impl Embedder for WhitespaceEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0; self.buckets];

        for token in text.split_whitespace() {
            let mut hasher = std::collections::hash_map::DefaultHasher::new();
            token.to_lowercase().hash(&mut hasher);
            let idx = (hasher.finish() as usize) % self.buckets;
            vector[idx] += 1.0;
        }

        Ok(vector)
    }
}

#[derive(Default)]
pub struct InMemoryVectorStore {
    entries: RwLock<Vec<(Document, Vec<f32>)>>,
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn add(&self, document: Document, embedding: Vec<f32>) -> Result<()> {
        self.entries.write().await.push((document, embedding));
        Ok(())
    }

    async fn search(&self, embedding: Vec<f32>, top_k: usize) -> Result<Vec<ScoredDocument>> {
        let entries = self.entries.read().await;
        let mut scored: Vec<ScoredDocument> = entries
            .iter()
            .map(|(doc, stored)| ScoredDocument {
                document: doc.clone(),
                score: cosine_similarity(stored, &embedding),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(top_k);
        Ok(scored)
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let (mut dot, mut norm_a, mut norm_b) = (0.0, 0.0, 0.0);
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a.sqrt() * norm_b.sqrt())
    }
}

/// Knowledge base over an embedder and a vector store. Queries return the
/// text of the `top_k` closest documents with any similarity at all.
pub struct VectorKnowledgeBase<E: Embedder, S: VectorStore> {
    embedder: Arc<E>,
    store: Arc<S>,
    top_k: usize,
}

impl VectorKnowledgeBase<WhitespaceEmbedder, InMemoryVectorStore> {
    /// Self-contained knowledge base with no external services.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(WhitespaceEmbedder::default()),
            Arc::new(InMemoryVectorStore::default()),
        )
    }
}

impl<E: Embedder, S: VectorStore> VectorKnowledgeBase<E, S> {
    pub fn new(embedder: Arc<E>, store: Arc<S>) -> Self {
        Self {
            embedder,
            store,
            top_k: 3,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }
}

#[async_trait]
impl<E, S> KnowledgeBase for VectorKnowledgeBase<E, S>
where
    E: Embedder,
    S: VectorStore,
{
    async fn add_document(&self, content: &str, source: Option<&str>) -> Result<()> {
        let document = Document {
            id: Uuid::new_v4().to_string(),
            text: content.to_string(),
            source: source.map(str::to_string),
        };
        let embedding = self.embedder.embed(content).await?;
        self.store.add(document, embedding).await
    }

    async fn query(&self, query: &str) -> Result<Vec<String>> {
        let embedding = self.embedder.embed(query).await?;
        let mut scored = self.store.search(embedding, self.top_k).await?;
        scored.retain(|doc| doc.score > 0.0);
        Ok(scored.into_iter().map(|doc| doc.document.text).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_closest_documents_first() {
        let kb = VectorKnowledgeBase::in_memory();
        kb.add_document("The borrow checker enforces ownership rules.", Some("rust-book"))
            .await
            .unwrap();
        kb.add_document("Paris is the capital of France.", None)
            .await
            .unwrap();

        let snippets = kb
            .query("the borrow checker enforces ownership rules.")
            .await
            .unwrap();
        assert!(!snippets.is_empty());
        assert!(snippets[0].contains("borrow checker"));
    }

    #[tokio::test]
    async fn empty_query_matches_nothing() {
        let kb = VectorKnowledgeBase::in_memory();
        kb.add_document("Sourdough needs a mature starter.", None)
            .await
            .unwrap();

        let snippets = kb.query("").await.unwrap();
        assert!(snippets.is_empty());
    }

    #[tokio::test]
    async fn honors_top_k() {
        let kb = VectorKnowledgeBase::in_memory().with_top_k(1);
        kb.add_document("rust ownership", None).await.unwrap();
        kb.add_document("rust borrowing", None).await.unwrap();

        let snippets = kb.query("rust").await.unwrap();
        assert_eq!(snippets.len(), 1);
    }
}
