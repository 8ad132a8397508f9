//! Global safety state machine: Init → Ready ↔ Active, any → Error → Init.
//!
//! `Ready` moves to `Active` only while the deadman is held and every
//! drive reports closed loop.
//!
//! `advance` is evaluated once per cycle and performs at most one
//! transition. Error takes precedence over every other rule. Total
//! heartbeat loss requests a reboot once per loss: on entry to `Error`
//! if every device is already silent, otherwise on the cycle the last
//! device goes silent while `Error` holds. The state
//! machine does not touch the bus; entry and exit actions are returned as
//! [`SafetyAction`] values in execution order (exit of the old state
//! first, then entry of the new one).

use heapless::Vec as HVec;
use rig_common::consts::MAX_TRANSITION_ACTIONS;
use rig_common::state::SystemState;
use tracing::{error, info};

use super::faults::FaultReport;

/// Side effect attached to a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafetyAction {
    /// Command zero torque on every device.
    StopAll,
    /// E-stop every device.
    RequestDisable,
    /// Reset the supervising controller.
    Reboot,
    /// Clear safe errors and request closed-loop control on every device.
    RequestEnable,
}

pub type ActionList = HVec<SafetyAction, MAX_TRANSITION_ACTIONS>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub from: SystemState,
    pub to: SystemState,
    pub actions: ActionList,
}

/// Result of one `advance` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvanceResult {
    Stay(SystemState),
    Changed(Transition),
    /// Still in `Error`, but the fault escalated; run these actions.
    Escalated(ActionList),
}

impl AdvanceResult {
    pub fn state(&self) -> SystemState {
        match self {
            Self::Stay(state) => *state,
            Self::Changed(t) => t.to,
            Self::Escalated(_) => SystemState::Error,
        }
    }

    /// Actions the caller must execute, in order.
    pub fn actions(&self) -> &[SafetyAction] {
        match self {
            Self::Stay(_) => &[],
            Self::Changed(t) => t.actions.as_slice(),
            Self::Escalated(actions) => actions.as_slice(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SafetyStateMachine {
    state: SystemState,
    transitions: u64,
    /// `all_timed_out()` as of the previous `advance`.
    all_lost: bool,
}

impl SafetyStateMachine {
    pub const fn new() -> Self {
        Self {
            state: SystemState::Init,
            transitions: 0,
            all_lost: false,
        }
    }

    #[inline]
    pub const fn state(&self) -> SystemState {
        self.state
    }

    /// Number of transitions taken since construction.
    #[inline]
    pub const fn transition_count(&self) -> u64 {
        self.transitions
    }

    /// Evaluate the transition rules once.
    pub fn advance(&mut self, report: &FaultReport, deadman: bool) -> AdvanceResult {
        use SystemState::*;

        let newly_lost = report.all_timed_out() && !self.all_lost;
        self.all_lost = report.all_timed_out();

        let next = if report.has_error() {
            (self.state != Error).then_some(Error)
        } else {
            match self.state {
                Init => Some(Ready),
                Ready if deadman && report.unarmed.is_none() => Some(Active),
                Active if !deadman => Some(Ready),
                Error if !report.all_timed_out() => Some(Init),
                _ => None,
            }
        };

        let Some(to) = next else {
            if self.state == Error && newly_lost {
                error!(
                    heartbeat_lost = report.heartbeat_lost,
                    "every device silent while in ERROR"
                );
                let mut actions = ActionList::new();
                push(&mut actions, SafetyAction::Reboot);
                return AdvanceResult::Escalated(actions);
            }
            return AdvanceResult::Stay(self.state);
        };

        let from = self.state;
        let mut actions = ActionList::new();
        exit_actions(from, &mut actions);
        entry_actions(to, report, &mut actions);

        if to == Error {
            error!(
                %from,
                heartbeat_lost = report.heartbeat_lost,
                all_lost = report.all_lost,
                estop = report.estop,
                device_fault = ?report.device_fault,
                mode_mismatch = ?report.mode_mismatch,
                "entering ERROR"
            );
        } else {
            info!(%from, %to, "state transition");
        }

        self.state = to;
        self.transitions += 1;
        AdvanceResult::Changed(Transition { from, to, actions })
    }
}

impl Default for SafetyStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

fn exit_actions(from: SystemState, actions: &mut ActionList) {
    if from == SystemState::Active {
        push(actions, SafetyAction::StopAll);
    }
}

fn entry_actions(to: SystemState, report: &FaultReport, actions: &mut ActionList) {
    match to {
        SystemState::Error => {
            push(actions, SafetyAction::RequestDisable);
            if report.all_timed_out() {
                push(actions, SafetyAction::Reboot);
            }
        }
        SystemState::Init => push(actions, SafetyAction::RequestEnable),
        SystemState::Ready | SystemState::Active => {}
    }
}

fn push(actions: &mut ActionList, action: SafetyAction) {
    // At most three actions per transition (StopAll, RequestDisable, Reboot).
    let _ = actions.push(action);
}
