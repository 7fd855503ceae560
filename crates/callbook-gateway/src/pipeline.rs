//! The per-turn pipeline: transcript in, protocol messages and record writes out.
//!
//! Stages run in a fixed order and each one is independently fallible. A
//! stage failure is logged and replaced by that stage's default result; the
//! turn always reaches the final sequence.

use std::sync::Arc;
use std::time::Duration;

use rand::seq::IndexedRandom;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use callbook_core::config::ConversationConfig;
use callbook_core::error::Result;
use callbook_core::protocol::ServerMessage;
use callbook_core::session::{BookingField, ExtractedFields, RecordId, Session, SessionId};
use callbook_core::session_store::SharedSession;
use callbook_media::{SpeechSynthesizer, VoiceConfig};
use callbook_providers::{ChatMessage, CompletionRequest, LlmProvider};
use callbook_records::{REPLY_PLACEHOLDER, RecordFields, RecordStore};

use crate::audio_store::AudioStore;
use crate::extraction::{extraction_prompt, parse_extraction, reply_prompt};
use crate::hold::HoldTimer;

/// Outbound half of a connection, in send order.
pub type Outbound = mpsc::UnboundedSender<ServerMessage>;

/// External services a turn depends on.
#[derive(Clone)]
pub struct Collaborators {
    pub llm: Arc<dyn LlmProvider>,
    pub tts: Arc<dyn SpeechSynthesizer>,
    pub records: Arc<dyn RecordStore>,
}

/// Summary of one executed turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    /// Fields whose value changed this turn.
    pub updated_fields: Vec<BookingField>,
    /// Fields still empty after this turn.
    pub missing: Vec<BookingField>,
    /// Generated reply, empty when generation failed.
    pub reply: String,
    pub record_id: Option<RecordId>,
    /// Whether hold audio started before the reply was ready.
    pub hold_fired: bool,
}

pub struct TurnPipeline {
    collaborators: Collaborators,
    audio: Arc<AudioStore>,
    voice: VoiceConfig,
    conversation: ConversationConfig,
    hold_delay: Duration,
}

impl TurnPipeline {
    pub fn new(
        collaborators: Collaborators,
        audio: Arc<AudioStore>,
        voice: VoiceConfig,
        conversation: ConversationConfig,
        hold_delay: Duration,
    ) -> Self {
        Self {
            collaborators,
            audio,
            voice,
            conversation,
            hold_delay,
        }
    }

    pub fn audio(&self) -> &Arc<AudioStore> {
        &self.audio
    }

    /// Run one turn for `session`. Never fails; see [`TurnOutcome`].
    pub async fn run_turn(
        &self,
        session: &SharedSession,
        transcript: &str,
        out: &Outbound,
    ) -> TurnOutcome {
        let mut session = session.lock().await;
        session.turns += 1;
        let session_id = session.id;
        info!(session_id = %session_id, turn = session.turns, %transcript, "Turn started");

        // The client only speaks again after the previous reply finished playing.
        let stale = self.audio.remove_session(session_id).await;
        if stale > 0 {
            debug!(session_id = %session_id, clips = stale, "Dropped clips from the previous turn");
        }

        self.send_filler(session_id, out).await;
        let hold = self.arm_hold(session_id, out);

        let extracted = self.extract_fields(session_id, transcript).await;
        let updated_fields = session.booking.apply(&extracted);
        if !updated_fields.is_empty() {
            debug!(session_id = %session_id, fields = ?updated_fields, "Booking fields updated");
        }

        self.persist_turn(&mut session, &updated_fields, transcript)
            .await;

        let missing = session.booking.missing();
        if session.booking.is_complete() {
            info!(session_id = %session_id, "All booking details collected");
        }
        let reply = self.generate_reply(session_id, &missing, transcript).await;
        self.persist_reply(&session, &reply).await;

        let hold_fired = hold.as_ref().is_some_and(HoldTimer::cancel);
        emit(out, ServerMessage::StopBackground, session_id);

        if !self.conversation.acknowledgment.trim().is_empty() {
            let ack = self.conversation.acknowledgment.clone();
            if let Some(audio_ref) = self.speak(session_id, &ack, "acknowledgment").await {
                emit(out, ServerMessage::filler(audio_ref), session_id);
            }
        }

        let spoken = if reply.trim().is_empty() {
            self.conversation.fallback_reply.as_str()
        } else {
            reply.as_str()
        };
        if let Some(audio_ref) = self.speak(session_id, spoken, "reply").await {
            emit(out, ServerMessage::reply(audio_ref), session_id);
        }

        info!(
            session_id = %session_id,
            updated = updated_fields.len(),
            missing = missing.len(),
            hold_fired,
            "Turn complete"
        );

        TurnOutcome {
            updated_fields,
            missing,
            reply,
            record_id: session.record_id().cloned(),
            hold_fired,
        }
    }

    /// Stage 1.
    async fn send_filler(&self, session_id: SessionId, out: &Outbound) {
        let phrase = {
            let mut rng = rand::rng();
            self.conversation.filler_phrases.choose(&mut rng).cloned()
        };
        let Some(phrase) = phrase else {
            return;
        };
        if let Some(audio_ref) = self.speak(session_id, &phrase, "filler").await {
            emit(out, ServerMessage::filler(audio_ref), session_id);
        }
    }

    /// Stage 2.
    fn arm_hold(&self, session_id: SessionId, out: &Outbound) -> Option<HoldTimer> {
        match self.audio.hold_ref() {
            Some(hold_ref) => Some(HoldTimer::arm(self.hold_delay, hold_ref, out.clone())),
            None => {
                debug!(session_id = %session_id, "No hold audio configured, skipping hold timer");
                None
            }
        }
    }

    /// Stage 3. Failures yield no fields.
    async fn extract_fields(&self, session_id: SessionId, transcript: &str) -> ExtractedFields {
        let request = CompletionRequest::new(vec![ChatMessage::system(extraction_prompt(
            transcript,
        ))]);
        let result: Result<ExtractedFields> = async {
            let raw = self.collaborators.llm.complete(&request).await?;
            debug!(session_id = %session_id, %raw, "Extraction output");
            parse_extraction(&raw)
        }
        .await;

        result.unwrap_or_else(|e| {
            warn!(session_id = %session_id, stage = "extraction", error = %e, "Extraction failed, no fields updated");
            ExtractedFields::new()
        })
    }

    /// Stage 4. Creates the record on first success, updates it afterwards.
    async fn persist_turn(
        &self,
        session: &mut Session,
        updated_fields: &[BookingField],
        transcript: &str,
    ) {
        let records = &self.collaborators.records;

        match session.record_id().cloned() {
            None => {
                // Everything filled so far, including turns whose create failed.
                let filled: Vec<BookingField> =
                    session.booking.filled().map(|(field, _)| field).collect();
                let fields = RecordFields::from_booking(&session.booking, &filled)
                    .with_transcript(transcript)
                    .with_reply(REPLY_PLACEHOLDER);
                match records.create(&fields).await {
                    Ok(record_id) => {
                        info!(session_id = %session.id, %record_id, "Booking record created");
                        session.assign_record_id(record_id);
                    }
                    Err(e) => {
                        warn!(session_id = %session.id, stage = "persistence", error = %e, "Record create failed");
                    }
                }
            }
            Some(record_id) => {
                let fields = RecordFields::from_booking(&session.booking, updated_fields)
                    .with_transcript(transcript);
                if let Err(e) = records.update(&record_id, &fields).await {
                    warn!(session_id = %session.id, %record_id, stage = "persistence", error = %e, "Record update failed");
                }
            }
        }
    }

    /// Stage 5. Failures yield an empty reply.
    async fn generate_reply(
        &self,
        session_id: SessionId,
        missing: &[BookingField],
        transcript: &str,
    ) -> String {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(reply_prompt(missing)),
            ChatMessage::user(transcript),
        ]);
        match self.collaborators.llm.complete(&request).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(session_id = %session_id, stage = "reply", error = %e, "Reply generation failed");
                String::new()
            }
        }
    }

    /// Stage 6.
    async fn persist_reply(&self, session: &Session, reply: &str) {
        let Some(record_id) = session.record_id() else {
            return;
        };
        let fields = RecordFields::new().with_reply(reply);
        if let Err(e) = self.collaborators.records.update(record_id, &fields).await {
            warn!(session_id = %session.id, %record_id, stage = "reply_persistence", error = %e, "Reply update failed");
        }
    }

    /// Synthesize `text` and store the clip. `None` when synthesis failed.
    async fn speak(&self, session_id: SessionId, text: &str, stage: &'static str) -> Option<String> {
        match self.collaborators.tts.synthesize(text, &self.voice).await {
            Ok(audio) => Some(self.audio.put(session_id, audio).await),
            Err(e) => {
                warn!(session_id = %session_id, stage, error = %e, "Speech synthesis failed");
                None
            }
        }
    }
}

fn emit(out: &Outbound, message: ServerMessage, session_id: SessionId) {
    if out.send(message).is_err() {
        debug!(session_id = %session_id, "Connection closed, dropping message");
    }
}
