//! Spoken guidance.

use std::sync::Arc;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SpeechError {
    #[error("speech engine unavailable: {0}")]
    Unavailable(String),
    #[error("speech failed: {0}")]
    Failed(String),
}

/// A text-to-speech engine.
pub trait SpeechSynthesizer: Send + Sync {
    /// Cut off whatever is being spoken.
    fn stop(&self);

    /// Speak `utterance`, replacing anything still queued.
    fn speak(&self, utterance: &str) -> Result<(), SpeechError>;
}

/// Speaks guidance, one utterance at a time.
///
/// An engine that failed to start leaves the voice silent; text guidance is
/// unaffected.
#[derive(Clone)]
pub struct GuidanceVoice {
    engine: Option<Arc<dyn SpeechSynthesizer>>,
}

impl GuidanceVoice {
    pub fn new(engine: Result<Arc<dyn SpeechSynthesizer>, SpeechError>) -> Self {
        match engine {
            Ok(engine) => Self {
                engine: Some(engine),
            },
            Err(err) => {
                tracing::warn!("Voice guidance disabled: {}", err);
                Self::silent()
            }
        }
    }

    pub fn silent() -> Self {
        Self { engine: None }
    }

    pub fn is_available(&self) -> bool {
        self.engine.is_some()
    }

    pub fn announce(&self, utterance: &str) {
        let Some(engine) = &self.engine else {
            return;
        };
        engine.stop();
        if let Err(err) = engine.speak(utterance) {
            tracing::warn!("Failed to speak guidance: {}", err);
        }
    }
}

/// Writes utterances to the log instead of a speaker.
#[derive(Debug, Default)]
pub struct LogSpeech;

impl SpeechSynthesizer for LogSpeech {
    fn stop(&self) {}

    fn speak(&self, utterance: &str) -> Result<(), SpeechError> {
        tracing::info!("Speaking: {}", utterance);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
    }

    impl SpeechSynthesizer for Recorder {
        fn stop(&self) {
            self.calls.lock().unwrap().push("stop".to_string());
        }

        fn speak(&self, utterance: &str) -> Result<(), SpeechError> {
            self.calls.lock().unwrap().push(utterance.to_string());
            Ok(())
        }
    }

    #[test]
    fn stops_before_each_utterance() {
        let recorder = Arc::new(Recorder::default());
        let engine: Arc<dyn SpeechSynthesizer> = recorder.clone();
        let voice = GuidanceVoice::new(Ok(engine));

        voice.announce("Turn left");
        voice.announce("Turn right");

        assert_eq!(
            *recorder.calls.lock().unwrap(),
            vec!["stop", "Turn left", "stop", "Turn right"]
        );
    }

    #[test]
    fn failed_engine_is_silent() {
        let voice = GuidanceVoice::new(Err(SpeechError::Unavailable("no engine".to_string())));
        assert!(!voice.is_available());
        voice.announce("ignored");
    }
}
