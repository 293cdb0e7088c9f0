mod executable;
mod package_json;
mod package_lock;
mod range;
mod registry;

pub use executable::{Npm, NpmError};
pub use package_json::{PACKAGE_JSON_FILE, PackageJson, ResolvedDependencies};
pub use package_lock::{PACKAGE_LOCK_FILE, PackageLockJson};
pub use range::{InvalidRange, VersionRange, exact_version};
pub use registry::{DEFAULT_NPM_REGISTRY_URL, NpmRegistryClient};
