/*! Integration tests for Specular.
 *
 * This test suite is organized as a single integration test binary
 * following the pattern described by matklad in
 * https://matklad.github.io/2021/02/27/delete-cargo-integration-tests.html
 *
 * The module structure mirrors the main library structure:
 * - diff: Edit-script generation against live documents
 * - mirror: The orchestrator's subscription and sync protocol
 * - movable: Identity-tracked list reordering
 * - tree: Hierarchical tree mirroring and deferred node identity
 * - roundtrip: Randomized document-to-state reconciliation
 */

use tracing_subscriber::EnvFilter;

#[ctor::ctor]
fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("specular=info".parse().unwrap()),
        )
        .with_test_writer()
        .try_init();
}

mod diff;
mod helpers;
mod mirror;
mod movable;
mod roundtrip;
mod tree;
