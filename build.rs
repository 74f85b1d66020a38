//! Build script: re-runs the crate's build when the migrations directory
//! changes, so `sqlx`'s `migrate!()` macro picks up new migration files.

/// Main build script entry point.
///
/// Tells Cargo to rerun the build when files in the migrations directory change,
/// which is required for the `SQLx` migration system to work properly.
fn main() {
    println!("cargo:rerun-if-changed=migrations");
}
