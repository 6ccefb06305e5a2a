//! # Protocol State Test Suite
//!
//! Cross-crate flows that drive `qc-protocol-state` through the public
//! mutator and snapshot APIs with notifications delivered over `shared-bus`.
//!
//! ## Structure
//!
//! ```text
//! tests/
//! ├── src/integration/   # Bus-backed lifecycle flows
//! └── benches/           # Criterion benchmarks for extend and snapshot reads
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p qc-tests
//! cargo bench -p qc-tests
//! ```

pub mod integration;
