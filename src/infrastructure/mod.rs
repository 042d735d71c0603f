pub mod explorer;
pub mod prover;
pub mod storage;
