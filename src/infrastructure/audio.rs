use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AlarmSound {
    #[default]
    Chime,
    Bell,
    Beeps,
}

impl AlarmSound {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Chime => "chime",
            Self::Bell => "bell",
            Self::Beeps => "beeps",
        }
    }

    fn pulses(self) -> usize {
        match self {
            Self::Chime => 1,
            Self::Bell => 2,
            Self::Beeps => 3,
        }
    }
}

#[async_trait]
pub trait AudioPlayer: Send + Sync {
    /// Pre-authorizes later automatic playback; triggered by an explicit user action.
    async fn unlock(&self) -> Result<(), InfraError>;

    fn is_unlocked(&self) -> bool;

    async fn play(&self, sound: AlarmSound) -> Result<(), InfraError>;
}

/// Rings the terminal bell; stays locked until the first Start or Preview.
#[derive(Debug, Default)]
pub struct TerminalBellPlayer {
    unlocked: AtomicBool,
}

const PULSE_GAP: Duration = Duration::from_millis(180);

#[async_trait]
impl AudioPlayer for TerminalBellPlayer {
    async fn unlock(&self) -> Result<(), InfraError> {
        self.unlocked.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_unlocked(&self) -> bool {
        self.unlocked.load(Ordering::SeqCst)
    }

    async fn play(&self, sound: AlarmSound) -> Result<(), InfraError> {
        if !self.is_unlocked() {
            return Err(InfraError::SideEffect(
                "alarm playback has not been unlocked".to_string(),
            ));
        }
        let mut stdout = tokio::io::stdout();
        for pulse in 0..sound.pulses() {
            if pulse > 0 {
                tokio::time::sleep(PULSE_GAP).await;
            }
            stdout.write_all(b"\x07").await?;
            stdout.flush().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bell_player_refuses_to_play_before_unlock() {
        let player = TerminalBellPlayer::default();
        assert!(!player.is_unlocked());
        assert!(matches!(
            player.play(AlarmSound::Chime).await,
            Err(InfraError::SideEffect(_))
        ));

        player.unlock().await.expect("unlock");
        assert!(player.is_unlocked());
    }

    #[test]
    fn alarm_sound_uses_lowercase_names() {
        let parsed: AlarmSound = serde_json::from_str("\"beeps\"").expect("parse");
        assert_eq!(parsed, AlarmSound::Beeps);
        assert_eq!(AlarmSound::default().as_str(), "chime");
        assert!(serde_json::from_str::<AlarmSound>("\"gong\"").is_err());
    }
}
