mod verification;

pub use verification::{Decision, NewVerification, Verification};
