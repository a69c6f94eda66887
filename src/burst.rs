//! Adaptive burst-mode state machine.
//!
//! The controller watches each frame's annotated detections and switches
//! between throttled (`Inactive`) and unthrottled (`Active`) analysis. The
//! active flag lives in a [`BurstState`] that can be shared with status
//! readers on other threads without taking a lock.

use crate::config::BurstConfig;
use crate::detection::{type_set, Detection};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Analysis mode chosen by the burst controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BurstMode {
    /// Baseline, rate-limited analysis
    Inactive,
    /// Minimal-delay analysis while new activity is in view
    Active,
}

impl BurstMode {
    pub fn is_active(&self) -> bool {
        matches!(self, BurstMode::Active)
    }
}

impl fmt::Display for BurstMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BurstMode::Inactive => write!(f, "INACTIVE"),
            BurstMode::Active => write!(f, "ACTIVE"),
        }
    }
}

/// Which frames end a burst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeactivationRule {
    /// Empty frame, all objects stationary, or the type set shrank to a proper
    /// subset of the previous frame's types with nothing new appearing
    #[default]
    TypesDeparted,
    /// Only an empty frame or an all-stationary frame ends a burst
    IdleOnly,
}

/// What caused a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BurstTrigger {
    NewType(String),
    NewInstance(String),
    NoDetections,
    AllStationary,
    TypesDeparted(Vec<String>),
}

impl fmt::Display for BurstTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BurstTrigger::NewType(label) => write!(f, "new object type: {}", label),
            BurstTrigger::NewInstance(label) => write!(f, "new {} entered", label),
            BurstTrigger::NoDetections => write!(f, "no detections"),
            BurstTrigger::AllStationary => write!(f, "all stationary"),
            BurstTrigger::TypesDeparted(labels) => {
                write!(f, "types departed: {}", labels.join(", "))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BurstTransition {
    pub from: BurstMode,
    pub to: BurstMode,
    pub trigger: BurstTrigger,
}

/// Process-wide burst state.
///
/// `active` is written only by the controller and read lock-free by anyone.
/// The previous frame's type set is copied out under a short lock.
#[derive(Debug, Default)]
pub struct BurstState {
    active: AtomicBool,
    previous_frame_types: Mutex<BTreeSet<String>>,
    transitions: AtomicU64,
}

impl BurstState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn mode(&self) -> BurstMode {
        if self.is_active() {
            BurstMode::Active
        } else {
            BurstMode::Inactive
        }
    }

    /// Copy of the type set seen in the most recent frame
    pub fn previous_types(&self) -> BTreeSet<String> {
        self.previous_frame_types.lock().clone()
    }

    /// Number of transitions since startup
    pub fn transition_count(&self) -> u64 {
        self.transitions.load(Ordering::Relaxed)
    }
}

/// State machine toggling between throttled and unthrottled analysis
pub struct BurstController {
    state: Arc<BurstState>,
    enabled: bool,
    rule: DeactivationRule,
}

impl BurstController {
    pub fn new(config: &BurstConfig) -> Self {
        Self::with_state(config, Arc::new(BurstState::new()))
    }

    pub fn with_state(config: &BurstConfig, state: Arc<BurstState>) -> Self {
        info!(
            enabled = config.enabled,
            rule = ?config.deactivation,
            "Burst controller initialized"
        );

        Self {
            state,
            enabled: config.enabled,
            rule: config.deactivation,
        }
    }

    /// Shared handle for status readers
    pub fn state(&self) -> Arc<BurstState> {
        Arc::clone(&self.state)
    }

    pub fn mode(&self) -> BurstMode {
        self.state.mode()
    }

    pub fn rule(&self) -> DeactivationRule {
        self.rule
    }

    /// Feed one frame's annotated detections through the state machine.
    ///
    /// The previous-frame type set is replaced on every call, whether or not
    /// the mode changes.
    pub fn observe(&mut self, detections: &[Detection]) -> Option<BurstTransition> {
        let current = type_set(detections);
        let mut previous = self.state.previous_frame_types.lock();

        let transition = if self.enabled {
            self.evaluate(detections, &current, &previous)
        } else {
            None
        };

        *previous = current;
        drop(previous);

        if let Some(transition) = &transition {
            self.state
                .active
                .store(transition.to.is_active(), Ordering::Release);
            self.state.transitions.fetch_add(1, Ordering::Relaxed);

            match transition.to {
                BurstMode::Active => {
                    info!(trigger = %transition.trigger, "Burst mode ACTIVATED");
                }
                BurstMode::Inactive => {
                    info!(trigger = %transition.trigger, "Burst mode DEACTIVATED");
                }
            }
        }

        transition
    }

    fn evaluate(
        &self,
        detections: &[Detection],
        current: &BTreeSet<String>,
        previous: &BTreeSet<String>,
    ) -> Option<BurstTransition> {
        let activation = activation_trigger(detections, previous);

        match self.state.mode() {
            BurstMode::Inactive => activation.map(|trigger| BurstTransition {
                from: BurstMode::Inactive,
                to: BurstMode::Active,
                trigger,
            }),
            BurstMode::Active => {
                if let Some(trigger) = activation {
                    debug!(%trigger, "Burst mode remains active");
                    return None;
                }

                deactivation_trigger(detections, current, previous, self.rule).map(|trigger| {
                    BurstTransition {
                        from: BurstMode::Active,
                        to: BurstMode::Inactive,
                        trigger,
                    }
                })
            }
        }
    }
}

/// A type absent from the previous frame with at least one moving detection,
/// or any detection the tracker flagged as a newly entered instance.
fn activation_trigger(
    detections: &[Detection],
    previous: &BTreeSet<String>,
) -> Option<BurstTrigger> {
    let new_type = detections
        .iter()
        .find(|d| !d.is_stationary && !previous.contains(&d.label))
        .map(|d| BurstTrigger::NewType(d.label.clone()));

    new_type.or_else(|| {
        detections
            .iter()
            .find(|d| d.is_new)
            .map(|d| BurstTrigger::NewInstance(d.label.clone()))
    })
}

fn deactivation_trigger(
    detections: &[Detection],
    current: &BTreeSet<String>,
    previous: &BTreeSet<String>,
    rule: DeactivationRule,
) -> Option<BurstTrigger> {
    if detections.is_empty() {
        return Some(BurstTrigger::NoDetections);
    }

    if detections.iter().all(|d| d.is_stationary) {
        return Some(BurstTrigger::AllStationary);
    }

    if rule == DeactivationRule::TypesDeparted
        && current.is_subset(previous)
        && current.len() < previous.len()
    {
        let departed = previous.difference(current).cloned().collect();
        return Some(BurstTrigger::TypesDeparted(departed));
    }

    None
}
