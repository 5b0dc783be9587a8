//! Commissioning 协调器
//!
//! - [`csr`]：VPN 管理器与协调器之间的单槽 CSR 交接
//! - [`diff`]：上次提交与本轮期望状态之间的最小差异
//! - [`commissioner`]：每轮计算期望状态、按需提交并持久化

pub mod commissioner;
pub mod csr;
pub mod diff;
pub mod error;

pub use commissioner::{
    COMMISSION_ACTION, COMMISSIONER_MODULE, CommissionOutcome, CommissionPaths, Commissioner,
    build_endpoint,
};
pub use csr::CsrSlot;
pub use diff::diff_payload;
pub use error::CommissionError;
