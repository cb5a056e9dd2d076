//! Node Builder (C3): groups consecutive chunks into coarse nodes used
//! by the 2-tier retrieval path, truncating node text to a character cap
//! and embedding each node exactly once per batch.

use common::domain::{Chunk, Node};
use common::ports::embedding::EmbeddingProvider;
use common::AppError;

#[derive(Debug, Clone, Copy)]
pub struct NodeBuilderConfig {
    pub group_size: usize,
    pub max_chars: usize,
}

impl Default for NodeBuilderConfig {
    fn default() -> Self {
        Self {
            group_size: 3,
            max_chars: 4000,
        }
    }
}

/// Groups `chunks[k*group_size .. k*group_size + group_size)` into node
/// `k`, joining chunk content with a blank line and truncating to
/// `max_chars`. Span is `(first_chunk.chunk_index, last_chunk.chunk_index)`.
/// Embeds every node text in a single batch call, preserving the
/// invariant that node construction never issues more than one embedding
/// request regardless of document size.
pub async fn build_nodes(
    workspace_id: uuid::Uuid,
    document_id: uuid::Uuid,
    chunks: &[Chunk],
    config: NodeBuilderConfig,
    embedder: &dyn EmbeddingProvider,
) -> Result<Vec<Node>, AppError> {
    if chunks.is_empty() {
        return Ok(Vec::new());
    }

    let groups: Vec<&[Chunk]> = chunks.chunks(config.group_size).collect();
    let texts: Vec<String> = groups
        .iter()
        .map(|group| truncate_chars(&join_group(group), config.max_chars))
        .collect();

    let embeddings = embedder.embed_batch(&texts).await?;

    let mut nodes = Vec::with_capacity(groups.len());
    for (idx, (group, (text, embedding))) in groups
        .iter()
        .zip(texts.into_iter().zip(embeddings.into_iter()))
        .enumerate()
    {
        let span_start = group.first().expect("group is non-empty").chunk_index;
        let span_end = group.last().expect("group is non-empty").chunk_index;
        nodes.push(Node::new(
            workspace_id,
            document_id,
            idx as i32,
            text,
            Some(embedding),
            span_start,
            span_end,
        ));
    }

    Ok(nodes)
}

fn join_group(group: &[Chunk]) -> String {
    group
        .iter()
        .map(|c| c.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use common::ports::embedding::EmbeddingProvider;
    use std::collections::HashMap;
    use uuid::Uuid;

    struct CountingEmbedder {
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for CountingEmbedder {
        async fn embed_query(&self, _text: &str) -> Result<Vec<f32>, AppError> {
            Ok(vec![0.0_f32; 8])
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(texts.iter().map(|_| vec![0.0_f32; 8]).collect())
        }

        fn model_id(&self) -> &str {
            "counting-embedder-test"
        }
    }

    fn make_chunk(document_id: Uuid, workspace_id: Uuid, idx: i32, content: &str) -> Chunk {
        Chunk::new(
            document_id,
            workspace_id,
            idx,
            content.to_string(),
            None,
            HashMap::new(),
        )
    }

    #[tokio::test]
    async fn groups_chunks_by_group_size_with_single_embed_call() {
        let workspace_id = Uuid::new_v4();
        let document_id = Uuid::new_v4();
        let chunks: Vec<Chunk> = (0..7)
            .map(|i| make_chunk(document_id, workspace_id, i, &format!("chunk {i}")))
            .collect();
        let embedder = CountingEmbedder {
            calls: std::sync::atomic::AtomicUsize::new(0),
        };
        let config = NodeBuilderConfig {
            group_size: 3,
            max_chars: 4000,
        };

        let nodes = build_nodes(workspace_id, document_id, &chunks, config, &embedder)
            .await
            .unwrap();

        assert_eq!(nodes.len(), 3);
        assert_eq!(nodes[0].span(), (0, 2));
        assert_eq!(nodes[1].span(), (3, 5));
        assert_eq!(nodes[2].span(), (6, 6));
        assert_eq!(embedder.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn truncates_node_text_to_max_chars() {
        let workspace_id = Uuid::new_v4();
        let document_id = Uuid::new_v4();
        let chunks = vec![make_chunk(document_id, workspace_id, 0, &"x".repeat(100))];
        let embedder = CountingEmbedder {
            calls: std::sync::atomic::AtomicUsize::new(0),
        };
        let config = NodeBuilderConfig {
            group_size: 3,
            max_chars: 10,
        };

        let nodes = build_nodes(workspace_id, document_id, &chunks, config, &embedder)
            .await
            .unwrap();

        assert_eq!(nodes[0].node_text.chars().count(), 10);
    }

    #[tokio::test]
    async fn empty_chunks_yields_no_nodes_and_no_embed_call() {
        let embedder = CountingEmbedder {
            calls: std::sync::atomic::AtomicUsize::new(0),
        };
        let nodes = build_nodes(
            Uuid::new_v4(),
            Uuid::new_v4(),
            &[],
            NodeBuilderConfig::default(),
            &embedder,
        )
        .await
        .unwrap();
        assert!(nodes.is_empty());
        assert_eq!(embedder.calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }
}
