//! Streaming large results over `stream/chunk` / `stream/end` / `stream/error`
//! notifications (spec.md §4.11, §3 "Active Stream").

use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ActiveStreamState {
    pub stream_id: String,
    pub content_type: String,
    pub chunk_size: usize,
    pub total_size: usize,
    pub sent: usize,
    pub cancelled: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamChunkNotification {
    pub stream_id: String,
    pub index: usize,
    pub data: String,
    pub offset: usize,
    pub size: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamEndNotification {
    pub stream_id: String,
    pub total_chunks: usize,
    pub total_size: usize,
    pub checksum: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamErrorNotification {
    pub stream_id: String,
    pub message: String,
}

impl ActiveStreamState {
    pub fn new(content_type: impl Into<String>, total_size: usize, chunk_size: usize) -> Self {
        Self {
            stream_id: format!("stream_{}", Uuid::new_v4()),
            content_type: content_type.into(),
            chunk_size: chunk_size.max(1),
            total_size,
            sent: 0,
            cancelled: false,
        }
    }

    pub fn total_chunks(&self) -> usize {
        self.total_size.div_ceil(self.chunk_size).max(1)
    }
}

/// Split `data` (already base64-encoded, if binary) into ordered chunk
/// notifications followed by an end notification, honoring an
/// already-computed checksum.
pub fn build_chunks(state: &ActiveStreamState, data: &str, checksum: Option<String>) -> (Vec<StreamChunkNotification>, StreamEndNotification) {
    let bytes = data.as_bytes();
    let mut chunks = Vec::new();
    let mut offset = 0;
    let mut index = 0;
    while offset < bytes.len() {
        let end = (offset + state.chunk_size).min(bytes.len());
        let slice = &bytes[offset..end];
        chunks.push(StreamChunkNotification {
            stream_id: state.stream_id.clone(),
            index,
            data: String::from_utf8_lossy(slice).into_owned(),
            offset,
            size: slice.len(),
        });
        offset = end;
        index += 1;
    }
    if chunks.is_empty() {
        chunks.push(StreamChunkNotification {
            stream_id: state.stream_id.clone(),
            index: 0,
            data: String::new(),
            offset: 0,
            size: 0,
        });
    }
    let end = StreamEndNotification {
        stream_id: state.stream_id.clone(),
        total_chunks: chunks.len(),
        total_size: bytes.len(),
        checksum,
    };
    (chunks, end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_data_into_expected_chunk_count() {
        let state = ActiveStreamState::new("text/plain", 25, 10);
        let (chunks, end) = build_chunks(&state, &"a".repeat(25), None);
        assert_eq!(chunks.len(), 3);
        assert_eq!(end.total_chunks, 3);
        assert_eq!(end.total_size, 25);
    }

    #[test]
    fn empty_data_still_emits_one_chunk() {
        let state = ActiveStreamState::new("text/plain", 0, 10);
        let (chunks, _end) = build_chunks(&state, "", None);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].size, 0);
    }

    #[test]
    fn chunk_offsets_are_contiguous() {
        let state = ActiveStreamState::new("text/plain", 15, 5);
        let (chunks, _) = build_chunks(&state, &"b".repeat(15), None);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.offset, i * 5);
        }
    }
}
