//! Verification of chains, bundles and anchors.
//!
//! The verifier never stops at the first problem: it returns a
//! [`VerificationReport`] listing every issue, each naming its record index
//! or anchor range. Use [`VerificationReport::into_result`] to turn a report
//! into the first error.

pub mod report;
pub mod verifier;

pub use report::{AnchorAssessment, Assurance, VerificationIssue, VerificationReport};
pub use verifier::Verifier;
