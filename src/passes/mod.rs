//! Per-chunk decoding passes, run in order by the transcriber

pub mod pass_0;
pub mod pass_1;
pub mod pass_2;
pub mod pass_3;
pub mod pass_4;
