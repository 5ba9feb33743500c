//! glycora-engine — The deterministic recommendation core.
//!
//! One request in, one result out: normalize the patient record, score every
//! candidate drug for clinical fit and coverage, rank and select picks,
//! resolve doses, and run the de-escalation chains. Everything reads only
//! from the `ConfigStore` and the `PatientProfile`; nothing mutates shared
//! state, so concurrent evaluation needs no locking.

pub mod clinical;
pub mod coverage;
pub mod deescalation;
pub mod dose_parse;
pub mod dosing;
pub mod engine;
pub mod glucose;
pub mod normalizer;
pub mod ranker;
pub mod request;
pub mod result;

pub use engine::Engine;
pub use request::PatientRequest;
pub use result::RecommendationResult;
