//! Synthesized clips awaiting download, keyed per session.
//!
//! Every clip gets its own id, so concurrent conversations never overwrite
//! each other's audio. Clips are dropped with their session.

use std::collections::HashMap;
use std::path::Path;

use axum::body::Bytes;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use callbook_core::error::{CallbookError, Result};
use callbook_core::protocol::HOLD_AUDIO_REF;
use callbook_core::session::SessionId;

/// ElevenLabs streams MP3.
pub const SYNTHESIZED_CONTENT_TYPE: &str = "audio/mpeg";

#[derive(Debug, Clone)]
pub struct AudioClip {
    pub data: Bytes,
    pub content_type: String,
}

#[derive(Default)]
pub struct AudioStore {
    clips: RwLock<HashMap<SessionId, HashMap<String, AudioClip>>>,
    hold: Option<AudioClip>,
}

impl AudioStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store with the shared hold asset read from `path`.
    pub fn with_hold_file(path: &Path) -> Result<Self> {
        let data = std::fs::read(path).map_err(|e| {
            CallbookError::Config(format!("hold audio {}: {e}", path.display()))
        })?;
        let content_type = mime_guess::from_path(path)
            .first_raw()
            .unwrap_or(SYNTHESIZED_CONTENT_TYPE)
            .to_string();
        info!(path = %path.display(), bytes = data.len(), %content_type, "Loaded hold audio");
        Ok(Self::new().with_hold_clip(AudioClip {
            data: Bytes::from(data),
            content_type,
        }))
    }

    pub fn with_hold_clip(mut self, clip: AudioClip) -> Self {
        self.hold = Some(clip);
        self
    }

    pub fn hold_clip(&self) -> Option<AudioClip> {
        self.hold.clone()
    }

    /// Reference clients use to fetch the hold asset.
    pub fn hold_ref(&self) -> Option<&'static str> {
        self.hold.as_ref().map(|_| HOLD_AUDIO_REF)
    }

    /// Store synthesized audio and return its `audio_ref`.
    pub async fn put(&self, session: SessionId, data: Vec<u8>) -> String {
        let clip_id = Uuid::new_v4().simple().to_string();
        let audio_ref = clip_ref(session, &clip_id);
        let clip = AudioClip {
            data: Bytes::from(data),
            content_type: SYNTHESIZED_CONTENT_TYPE.to_string(),
        };
        self.clips
            .write()
            .await
            .entry(session)
            .or_default()
            .insert(clip_id, clip);
        debug!(session_id = %session, clip = %audio_ref, "Stored clip");
        audio_ref
    }

    pub async fn get(&self, session: SessionId, clip_id: &str) -> Option<AudioClip> {
        self.clips
            .read()
            .await
            .get(&session)
            .and_then(|clips| clips.get(clip_id))
            .cloned()
    }

    pub async fn remove_session(&self, session: SessionId) -> usize {
        let removed = self
            .clips
            .write()
            .await
            .remove(&session)
            .map(|clips| clips.len())
            .unwrap_or(0);
        if removed > 0 {
            debug!(session_id = %session, removed, "Dropped session clips");
        }
        removed
    }

    pub async fn clip_count(&self, session: SessionId) -> usize {
        self.clips
            .read()
            .await
            .get(&session)
            .map(HashMap::len)
            .unwrap_or(0)
    }
}

pub fn clip_ref(session: SessionId, clip_id: &str) -> String {
    format!("/audio/{session}/{clip_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip_id(audio_ref: &str) -> &str {
        audio_ref.rsplit('/').next().unwrap()
    }

    #[tokio::test]
    async fn test_clips_are_unique_per_put() {
        let store = AudioStore::new();
        let session = SessionId::new();
        let a = store.put(session, b"one".to_vec()).await;
        let b = store.put(session, b"two".to_vec()).await;

        assert_ne!(a, b);
        assert!(a.starts_with(&format!("/audio/{session}/")));
        assert_eq!(
            store.get(session, clip_id(&a)).await.unwrap().data,
            Bytes::from_static(b"one")
        );
        assert_eq!(store.clip_count(session).await, 2);
    }

    #[tokio::test]
    async fn test_sessions_do_not_share_clips() {
        let store = AudioStore::new();
        let (a, b) = (SessionId::new(), SessionId::new());
        let r = store.put(a, b"reply".to_vec()).await;

        assert!(store.get(b, clip_id(&r)).await.is_none());
        assert_eq!(store.remove_session(a).await, 1);
        assert!(store.get(a, clip_id(&r)).await.is_none());
    }

    #[test]
    fn test_hold_file_content_type() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("holdon.mp3");
        std::fs::write(&path, b"ID3hold").unwrap();

        let store = AudioStore::with_hold_file(&path).unwrap();
        let hold = store.hold_clip().unwrap();
        assert_eq!(hold.content_type, "audio/mpeg");
        assert_eq!(store.hold_ref(), Some("/audio/hold"));

        assert!(AudioStore::with_hold_file(&dir.path().join("missing.mp3")).is_err());
        assert_eq!(AudioStore::new().hold_ref(), None);
    }
}
