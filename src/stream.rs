use crate::history::{ ConversationStore, StoreError };
use crate::llm::chat::ChatStream;
use crate::models::chat::MessageId;
use crate::segment::{ segment_with, Markers, SegmentedContent };

use futures::StreamExt;
use log::{ debug, error };
use std::error::Error as StdError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("Model stream failed: {source}")]
    Model {
        message_id: MessageId,
        source: Box<dyn StdError + Send + Sync>,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamedReply {
    pub message_id: MessageId,
    pub content: String,
}

/// Drains `stream` into a fresh trailing assistant message, handing the raw
/// buffer and its segmentation to `on_update` after every chunk.
///
/// A failed stream keeps whatever content arrived before the failure.
pub async fn pump<F>(
    mut stream: ChatStream,
    conversation: &ConversationStore,
    markers: &Markers,
    mut on_update: F
) -> Result<StreamedReply, StreamError>
    where F: FnMut(&str, &SegmentedContent<'_>)
{
    let message_id = conversation.begin_assistant();
    let mut buffer = String::new();
    let mut chunks = 0usize;

    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(text) => {
                if text.is_empty() {
                    continue;
                }
                if let Err(e) = conversation.extend(&message_id, &text) {
                    conversation.finish(&message_id);
                    return Err(e.into());
                }
                buffer.push_str(&text);
                chunks += 1;
                on_update(&buffer, &segment_with(&buffer, markers));
            }
            Err(e) => {
                error!("Model stream error after {} chunk(s): {}", chunks, e);
                conversation.finish(&message_id);
                return Err(StreamError::Model { message_id, source: e });
            }
        }
    }

    conversation.finish(&message_id);
    debug!("Model stream finished: {} chunk(s), {} byte(s)", chunks, buffer.len());
    Ok(StreamedReply { message_id, content: buffer })
}
