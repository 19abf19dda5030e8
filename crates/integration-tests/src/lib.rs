//! Shared library code for integration tests
//!
//! This module contains the test registry plumbing shared by the test
//! binary plus helpers for building Proxmox-shaped fixture payloads.

// Unfortunately needed here to work with linkme
#![allow(unsafe_code)]

use linkme::distributed_slice;

/// A test function that returns a Result
pub type TestFn = fn() -> color_eyre::Result<()>;

/// Metadata for a registered integration test
#[derive(Debug)]
pub struct IntegrationTest {
    /// Name of the integration test
    pub name: &'static str,
    /// Test function to execute
    pub f: TestFn,
}

impl IntegrationTest {
    /// Create a new integration test with the given name and function
    pub const fn new(name: &'static str, f: TestFn) -> Self {
        Self { name, f }
    }
}

/// Distributed slice holding all registered integration tests
#[distributed_slice]
pub static INTEGRATION_TESTS: [IntegrationTest];

/// Register an integration test with less boilerplate.
///
/// This macro generates the static registration for an integration test function.
///
/// # Examples
///
/// ```ignore
/// fn test_basic_functionality() -> Result<()> {
///     let output = run_selector(&stubs, None, &[])?;
///     output.assert_success("test");
///     Ok(())
/// }
/// integration_test!(test_basic_functionality);
/// ```
#[macro_export]
macro_rules! integration_test {
    ($fn_name:ident) => {
        ::paste::paste! {
            #[distributed_slice($crate::INTEGRATION_TESTS)]
            static [<$fn_name:upper>]: $crate::IntegrationTest =
                $crate::IntegrationTest::new(stringify!($fn_name), $fn_name);
        }
    };
}

/// Render a pvesh-shaped storage inventory payload.
///
/// Entries are `(identifier, type, active, content, avail)`. The activity
/// flag is emitted as a 0/1 integer the way pvesh does, and `enabled` is
/// omitted entirely, which is how the API reports enabled pools.
pub fn inventory_json(entries: &[(&str, &str, bool, &str, u64)]) -> String {
    let records: Vec<serde_json::Value> = entries
        .iter()
        .map(|(storage, ty, active, content, avail)| {
            serde_json::json!({
                "storage": storage,
                "type": ty,
                "active": if *active { 1 } else { 0 },
                "content": content,
                "avail": avail,
            })
        })
        .collect();
    serde_json::Value::Array(records).to_string()
}
