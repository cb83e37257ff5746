//! Per-client simulation state machine.
//!
//! A client walks `Starting -> Running -> (CriticalExit | Disconnected)`.
//! The machine itself does no I/O: [`ClientState::observe`] turns one
//! classifier sample into the ordered list of messages the client has to
//! send for that tick. The task in [`crate::driver`] owns the state, the
//! connection and the timing around it.

use crate::classifier::{Band, Sample};
use crate::message::Message;
use crate::ClientId;
use serde::{Deserialize, Serialize};

/// Lifecycle phase of a simulated client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientPhase {
    Starting,
    Running,
    CriticalExit,
    Disconnected,
}

impl ClientPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ClientPhase::CriticalExit | ClientPhase::Disconnected)
    }
}

/// Values recorded on transitions into NORMAL since the last reset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalStreak {
    values: Vec<f64>,
}

impl NormalStreak {
    pub fn count(&self) -> usize {
        self.values.len()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn average(&self) -> Option<f64> {
        if self.values.is_empty() {
            None
        } else {
            Some(self.values.iter().sum::<f64>() / self.values.len() as f64)
        }
    }

    fn push(&mut self, value: f64) {
        self.values.push(value);
    }

    fn reset(&mut self) {
        self.values.clear();
    }
}

/// Messages produced by one tick.
#[derive(Debug, Clone, Default)]
pub struct TickOutput {
    /// Messages in send order.
    pub messages: Vec<Message>,
    /// The tick announced a CRITICAL transition.
    pub critical: bool,
}

/// Mutable state of one simulated client.
#[derive(Debug, Clone)]
pub struct ClientState {
    id: ClientId,
    phase: ClientPhase,
    last_logged: Option<Band>,
    streak: NormalStreak,
    stability_window: usize,
}

impl ClientState {
    pub fn new(id: ClientId, stability_window: usize) -> Self {
        Self {
            id,
            phase: ClientPhase::Starting,
            last_logged: None,
            streak: NormalStreak::default(),
            stability_window: stability_window.max(1),
        }
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn phase(&self) -> ClientPhase {
        self.phase
    }

    /// Most recently announced band.
    pub fn last_logged_band(&self) -> Option<Band> {
        self.last_logged
    }

    pub fn normal_streak(&self) -> &NormalStreak {
        &self.streak
    }

    /// Moves a starting client to `Running`, returning the "Module started"
    /// message. Returns `None` in any other phase.
    pub fn start(&mut self) -> Option<Message> {
        if self.phase != ClientPhase::Starting {
            return None;
        }
        self.phase = ClientPhase::Running;
        Some(Message::started(self.id))
    }

    /// Processes one sample.
    ///
    /// Always emits the DATA message. A transition log follows only when the
    /// band differs from the last announced one, and the stability streak only
    /// moves on such transitions: repeated NORMAL samples do not count.
    pub fn observe(&mut self, sample: &Sample) -> TickOutput {
        let mut out = TickOutput::default();
        if self.phase != ClientPhase::Running {
            return out;
        }

        let value = sample.value;
        out.messages.push(Message::data(self.id, value));

        let band = sample.band;
        if self.last_logged == Some(band) {
            return out;
        }

        let text = match band {
            Band::Normal => format!("Value back to normal: {:.2}", value),
            _ => format!("Value entered {} range: {:.2}", band.label(), value),
        };
        out.messages
            .push(Message::new(band.message_type(), text, self.id));
        self.last_logged = Some(band);

        if band == Band::Normal {
            self.streak.push(value);
            if self.streak.count() == self.stability_window {
                let average = self.streak.average().unwrap_or(value);
                out.messages.push(Message::new(
                    Band::Normal.message_type(),
                    format!(
                        "Value stable for last {} samples, average value: {:.2}",
                        self.stability_window, average
                    ),
                    self.id,
                ));
                self.streak.reset();
            }
        } else if !self.streak.is_empty() {
            self.streak.reset();
        }

        if band == Band::Critical {
            out.critical = true;
            self.phase = ClientPhase::CriticalExit;
        }

        out
    }

    /// Marks the client disconnected unless it already reached a terminal phase.
    pub fn disconnect(&mut self) {
        if !self.phase.is_terminal() {
            self.phase = ClientPhase::Disconnected;
        }
    }
}
