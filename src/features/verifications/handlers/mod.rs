pub mod verification_handler;
