use super::{IndexError, RetrievedChunk, StoredPoint, VectorStore};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use uuid::Uuid;

struct Collection {
    dimension: usize,
    points: BTreeMap<Uuid, StoredPoint>,
}

/// Process-local vector store using brute-force cosine similarity.
#[derive(Default)]
pub struct MemoryVectorStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl MemoryVectorStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn ensure_collection(
        &self,
        collection: &str,
        dimension: usize,
    ) -> Result<(), IndexError> {
        let mut collections = self.collections.write().await;
        collections
            .entry(collection.to_string())
            .or_insert_with(|| Collection {
                dimension,
                points: BTreeMap::new(),
            });
        Ok(())
    }

    async fn upsert_points(
        &self,
        collection: &str,
        points: Vec<StoredPoint>,
    ) -> Result<(), IndexError> {
        let mut collections = self.collections.write().await;
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| IndexError::IndexNotFound(collection.to_string()))?;

        if let Some(point) = points
            .iter()
            .find(|point| point.vector.len() != target.dimension)
        {
            return Err(IndexError::DimensionMismatch {
                expected: target.dimension,
                actual: point.vector.len(),
            });
        }

        for point in points {
            target.points.insert(point.id, point);
        }
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: usize,
    ) -> Result<Vec<RetrievedChunk>, IndexError> {
        let collections = self.collections.read().await;
        let target = collections
            .get(collection)
            .ok_or_else(|| IndexError::IndexNotFound(collection.to_string()))?;

        let mut scored: Vec<_> = target
            .points
            .values()
            .map(|point| (cosine_similarity(&vector, &point.vector), point))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        Ok(scored
            .into_iter()
            .take(limit)
            .map(|(score, point)| RetrievedChunk {
                text: point.payload.text.clone(),
                document_id: Some(point.payload.document_id.clone()),
                source_page: Some(point.payload.source_page),
                name: Some(point.payload.name.clone()),
                score,
            })
            .collect())
    }

    async fn delete_by_document(
        &self,
        collection: &str,
        document_id: &str,
    ) -> Result<(), IndexError> {
        let mut collections = self.collections.write().await;
        if let Some(target) = collections.get_mut(collection) {
            target
                .points
                .retain(|_, point| point.payload.document_id != document_id);
        }
        Ok(())
    }

    async fn count_by_document(
        &self,
        collection: &str,
        document_id: &str,
    ) -> Result<usize, IndexError> {
        let collections = self.collections.read().await;
        Ok(collections.get(collection).map_or(0, |target| {
            target
                .points
                .values()
                .filter(|point| point.payload.document_id == document_id)
                .count()
        }))
    }

    async fn drop_collection(&self, collection: &str) -> Result<(), IndexError> {
        self.collections.write().await.remove(collection);
        Ok(())
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot_product / (norm_a * norm_b)
    }
}
