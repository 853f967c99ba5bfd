//! llm_bundler – package and serve LLMs as deployable service bundles
//! ==================================================================
//!
//! ## What it does
//! - **Resolves** a model identifier against the local model store, the
//!   filesystem, or the Hugging Face hub, and reads the architecture metadata
//!   the model declares about itself.
//! - **Selects** the model family via a frozen architecture→family table and
//!   materializes a fully-validated serving configuration from CLI flags,
//!   environment variables, and family defaults.
//! - **Synthesizes** a deployable service bundle (generated config document +
//!   static service entry) into an ephemeral staging area.
//! - **Packages** the bundle into a named, versioned record in the package
//!   store, or **launches** the external serving runtime immediately.
//!
//! The HTTP serving, batching, and tensor execution all live in the external
//! runtime; this crate only prepares and hands off.
//!
//! ```rust,no_run
//! use llm_bundler::*;
//!
//! fn main() -> LlmBundlerResult<()> {
//!     let home = BundlerHome::resolve()?;
//!     let store = ModelStore::open(&home)?;
//!     let resolved = resolve_model(&store, &HubLoader::new(), "google/flan-t5-large", None, None)?;
//!
//!     let map = ArchitectureMap::bundled();
//!     let family = map.resolve(&resolved.model_id, &resolved.metadata.architectures)?;
//!     let profile = family_profile(family).expect("mapped families have profiles");
//!
//!     let materialized = materialize(profile, &ConfigOverrides::default())?;
//!     let outcome = PackageBuild::builder()
//!         .store(&LocalPackageStore::open(&home)?)
//!         .tag(PackageTag::from_taglike("flan-t5-service:v1")?)
//!         .model_id(&resolved.model_id)
//!         .config(&materialized.config)
//!         .profile(profile)
//!         .build()
//!         .run()?;
//!
//!     println!("{} {}", outcome.state, outcome.record.tag);
//!     Ok(())
//! }
//! ```
//!
//! ## Pipeline
//!
//! ```text
//! CLI input
//!    │
//!    ├─→ resolve_model()      (store / path / hub → metadata)
//!    ├─→ ArchitectureMap      (declared architectures → family key)
//!    ├─→ materialize()        (override > env > default, validated)
//!    │
//!    ├─→ launch()             (immediate run: env mirror → ServerLoader)
//!    └─→ PackageBuild         (bundle synthesis → manifest → PackageStore)
//! ```

#[allow(unused_imports)]
use tracing::{debug, error, info, span, trace, warn, Level};

pub mod bundle;
pub mod config;
pub mod error;
pub mod fs;
pub mod launch;
pub mod logging;
pub mod model;
pub mod package;
pub mod resolver;

pub use bundle::{synthesize, BundleDescriptor, ServiceVars, SynthesisError, SERVICE_VARS_FILE};
pub use config::{
    materialize, ConfigOverrides, Dtype, Materialized, MaterializeWarning, Quantise,
    ResolvedConfig, ResourceSpec, Serialisation, ServicesConfig, TrafficSpec, ValidationError,
    DEFAULT_GPU_MEMORY_UTILIZATION, DEFAULT_TIMEOUT_SECS,
};
pub use error::{LlmBundlerError, LlmBundlerResult};
pub use fs::{BundlerHome, ValidDir, ValidFile, HOME_ENV_VAR};
pub use launch::{
    environment_mirror, launch, ProcessLoader, ServerLoader, DEFAULT_LOADER_PROGRAM,
};
pub use logging::{debug_mode, quiet_mode, LoggingConfig};
pub use model::{
    resolve_model, CachedModelRef, HubLoader, ModelMetadata, ModelStore, ResolvedModel,
};
pub use package::{
    normalise_model_name, BuildError, BuildOutcome, EnvironmentEntry, LocalPackageStore,
    PackageBuild, PackageManifest, PackageRecord, PackageState, PackageStore, PackageTag,
};
pub use resolver::{family_profile, ArchitectureMap, FamilyProfile, ResolutionError};
