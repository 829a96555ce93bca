//! # PMU Network Services
//!
//! - `pmu_server`: The IEEE C37.118 protocol server a PDC connects to.

pub mod pmu_server;
