//! Transaction candidates: model and approval staging.

mod model;
mod repository;

pub use model::{ApprovalStatus, Candidate, CandidateId, Decision, Source};
pub use repository::CandidateRepository;
