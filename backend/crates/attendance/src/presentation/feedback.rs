//! Operator feedback
//!
//! What the operator sees and hears for one resolved scan. Rendering and
//! audio playback belong to the front end; this module only decides the
//! content.

use std::fmt;

use derive_more::Display;

use crate::domain::value_objects::{LocalScanId, ScanOutcome};

/// Sound played with the flash
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SoundCue {
    /// Rising two-tone sine
    #[display("chime")]
    Chime,
    /// Two short beeps
    #[display("double-beep")]
    DoubleBeep,
    /// Three falling sawtooth tones
    #[display("descending")]
    Descending,
    /// Falling sawtooth sweep
    #[display("buzz")]
    Buzz,
}

/// Which path produced the outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The backend answered the scan directly
    Server,
    /// Accepted locally and queued for the next sync
    Queued(LocalScanId),
    /// Decided locally without queuing (expired, rejected, already queued today)
    Local,
    /// Answered from the cached directory snapshot
    Directory,
}

impl Resolution {
    pub fn is_offline(&self) -> bool {
        !matches!(self, Resolution::Server)
    }
}

/// Everything shown for one resolved scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanFeedback {
    pub outcome: ScanOutcome,
    pub name: String,
    pub detail: Option<String>,
    pub resolution: Resolution,
}

impl ScanFeedback {
    pub fn new(outcome: ScanOutcome, name: impl Into<String>, resolution: Resolution) -> Self {
        Self {
            outcome,
            name: name.into(),
            detail: None,
            resolution,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        self.detail = (!detail.is_empty()).then_some(detail);
        self
    }

    pub fn headline(&self) -> &'static str {
        headline(self.outcome)
    }

    pub fn icon(&self) -> &'static str {
        icon(self.outcome)
    }

    pub fn sound(&self) -> SoundCue {
        sound(self.outcome)
    }

    /// Whether the scan sits in the local queue awaiting sync
    pub fn is_pending_sync(&self) -> bool {
        matches!(self.resolution, Resolution::Queued(_))
    }
}

impl fmt::Display for ScanFeedback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.icon(), self.headline())?;
        if !self.name.is_empty() {
            write!(f, " {}", self.name)?;
        }
        if let Some(detail) = &self.detail {
            write!(f, " · {}", detail)?;
        }
        if self.is_pending_sync() {
            write!(f, " (sin conexión, pendiente de sincronizar)")?;
        }
        Ok(())
    }
}

pub const fn headline(outcome: ScanOutcome) -> &'static str {
    match outcome {
        ScanOutcome::Success => "¡BIENVENIDO!",
        ScanOutcome::Warning => "YA REGISTRADO",
        ScanOutcome::Debe => "MENSUALIDAD VENCIDA",
        ScanOutcome::Error => "CREDENCIAL INVÁLIDA",
    }
}

pub const fn icon(outcome: ScanOutcome) -> &'static str {
    match outcome {
        ScanOutcome::Success => "✅",
        ScanOutcome::Warning => "⚠️",
        ScanOutcome::Debe => "🚫",
        ScanOutcome::Error => "❌",
    }
}

pub const fn sound(outcome: ScanOutcome) -> SoundCue {
    match outcome {
        ScanOutcome::Success => SoundCue::Chime,
        ScanOutcome::Warning => SoundCue::DoubleBeep,
        ScanOutcome::Debe => SoundCue::Descending,
        ScanOutcome::Error => SoundCue::Buzz,
    }
}
