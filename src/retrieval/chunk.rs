//! Overlapping character chunking for corpus preparation.

/// Configuration for text chunking.
#[derive(Debug, Clone)]
pub struct ChunkConfig {
    /// Maximum characters per chunk.
    pub chunk_size: usize,
    /// Overlap between consecutive chunks.
    pub chunk_overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 800,
            chunk_overlap: 200,
        }
    }
}

/// Chunk text into overlapping segments, preferring sentence boundaries.
pub fn chunk_text(text: &str, config: &ChunkConfig) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let text_len = chars.len();
    let mut chunks = Vec::new();

    if text_len == 0 {
        return chunks;
    }

    if text_len <= config.chunk_size {
        let only = text.trim();
        if !only.is_empty() {
            chunks.push(only.to_string());
        }
        return chunks;
    }

    let mut start = 0;
    while start < text_len {
        let end = (start + config.chunk_size).min(text_len);

        // Break at the last sentence ending within the tail of the chunk
        let adjusted_end = if end < text_len {
            let search_start = end.saturating_sub(100).max(start);
            chars[search_start..end]
                .iter()
                .rposition(|c| matches!(c, '.' | '!' | '?'))
                .map(|pos| search_start + pos + 1)
                .filter(|&candidate| candidate > start)
                .unwrap_or(end)
        } else {
            end
        };

        let final_end = adjusted_end.max(start + 1).min(text_len);
        let chunk: String = chars[start..final_end].iter().collect();
        let chunk = chunk.trim();
        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }

        if final_end >= text_len {
            break;
        }

        // Step forward with overlap, always making progress
        let next_start = final_end.saturating_sub(config.chunk_overlap);
        start = if next_start <= start {
            start + 1
        } else {
            next_start
        };
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_single_chunk() {
        let config = ChunkConfig::default();
        let chunks = chunk_text("A short passage.", &config);
        assert_eq!(chunks, vec!["A short passage.".to_string()]);
    }

    #[test]
    fn test_empty_text() {
        let config = ChunkConfig::default();
        assert!(chunk_text("", &config).is_empty());
        assert!(chunk_text("   ", &config).is_empty());
    }

    #[test]
    fn test_chunks_cover_text_with_overlap() {
        let sentence = "Energy is conserved in every closed system we study. ";
        let text = sentence.repeat(20);
        let config = ChunkConfig {
            chunk_size: 120,
            chunk_overlap: 30,
        };

        let chunks = chunk_text(&text, &config);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(!chunk.is_empty());
            assert!(chunk.chars().count() <= 120);
        }
    }

    #[test]
    fn test_prefers_sentence_boundary() {
        let text = "First sentence ends here. Second sentence is much longer and keeps going for a while without stopping.";
        let config = ChunkConfig {
            chunk_size: 40,
            chunk_overlap: 5,
        };

        let chunks = chunk_text(&text, &config);
        assert!(chunks[0].ends_with('.'));
    }

    #[test]
    fn test_always_progresses() {
        // Overlap >= chunk size must not loop forever
        let text = "abcdefghij".repeat(10);
        let config = ChunkConfig {
            chunk_size: 10,
            chunk_overlap: 10,
        };
        let chunks = chunk_text(&text, &config);
        assert!(!chunks.is_empty());
    }
}
