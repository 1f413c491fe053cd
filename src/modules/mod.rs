pub mod coordination;
pub mod storage;
