mod verification_dto;

pub use verification_dto::{SubmitResultDto, SubmitVerificationDto, VerificationResponseDto};
