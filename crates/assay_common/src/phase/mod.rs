//! Phase State Machine v0.4.0
//!
//! Lifecycle: IDLE -> ABDUCTION -> DEDUCTION -> INDUCTION -> AUDIT -> DECISION -> OPERATION
//!
//! Every move is gated by:
//! - Role authorisation against a fixed transition table
//! - An evidence anchor whose shape fits the target phase
//! - For OPERATION only, a live reliability check against the threshold

pub mod anchor;
pub mod machine;
pub mod provider;
pub mod state;

pub use machine::{is_valid_role_for_phase, PhaseMachine, TransitionDecision};
pub use provider::{DerivedPhase, PersistedPhase, PhaseProvider};
pub use state::{
    EvidenceStub, Phase, Role, RoleAssignment, State, DEFAULT_ASSURANCE_THRESHOLD,
};
