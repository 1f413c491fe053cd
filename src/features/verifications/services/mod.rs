mod verification_resolver;

pub use verification_resolver::{SubmitOutcome, VerificationResolver};
