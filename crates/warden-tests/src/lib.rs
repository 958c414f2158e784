// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # WARDEN Integration Tests
//!
//! Integration tests and shared test utilities for the WARDEN permission
//! engine.
//!
//! ## Module Structure
//!
//! - [`common`]: Shared test utilities
//!   - `fixtures`: Pre-built ranks, principals, and config documents
//!   - `builders`: A service wired to a manual clock and inspectable sinks
//!   - `assertions`: Permission and audit assertion helpers
//!   - `mocks`: Recording identity bridge and fault-injecting persistence
//!   - `harness`: Temp-directory harness for file-backed tests
//!
//! ## Running Tests
//!
//! ```bash
//! # Run all integration tests
//! cargo test -p warden-tests
//!
//! # Run a specific suite
//! cargo test -p warden-tests --test integration_resolver
//! cargo test -p warden-tests --test integration_service
//! cargo test -p warden-tests --test integration_audit
//! cargo test -p warden-tests --test integration_config
//! ```
//!
//! ## Writing New Tests
//!
//! ```rust,ignore
//! use chrono::Duration;
//! use warden_tests::prelude::*;
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let env = TestServiceBuilder::new().with_standard_ranks().build().await;
//!     let id = env.connect("steve").await;
//!     env.clock.advance(Duration::minutes(5));
//!     assert_granted(&env.service, &id, "essentials.spawn");
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod common;

/// Re-export commonly used items for convenience.
pub mod prelude {
    pub use crate::common::assertions::*;
    pub use crate::common::builders::*;
    pub use crate::common::fixtures::*;
    pub use crate::common::harness::*;
    pub use crate::common::mocks::*;
}
