pub mod engine;
pub mod states;

pub use engine::{request_gate, review_gate, review_phase, review_request, TransitionError};
pub use states::{
    PhaseKind, RequestEffect, RequestOutcome, RequestStep, ReviewAction, ReviewEffect,
    ReviewOutcome,
};
