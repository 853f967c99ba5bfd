mod arch;
mod family;

pub use arch::{ArchitectureMap, ResolutionError};
pub use family::{family_profile, FamilyProfile, FAMILY_PROFILES};
