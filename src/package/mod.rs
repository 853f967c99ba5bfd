mod builder;
mod manifest;
mod store;
mod tag;

pub use builder::{BuildError, BuildOutcome, PackageBuild, PackageState};
pub use manifest::{
    runtime_packages, EnvironmentEntry, PackageManifest, RuntimeOptions, BASE_RUNTIME_PACKAGES,
    EXCLUDE_PATTERNS, RUNTIME_PYTHON_VERSION,
};
pub use store::{LocalPackageStore, PackageRecord, PackageStore};
pub use tag::{normalise_model_name, PackageTag};
