// strata-core/src/lib.rs
//
// Dependency domain resolution for the strata bundle repository.
//
// The crate turns declared bundle dependencies into isolation domains:
// bundles that are mutually shared resolve to a single instance per
// logical name, while bundles reached through a private dependency
// edge get their own isolated subtree. The resulting domains are
// structurally comparable, realized at most once through a registry,
// and serializable in a compact self-referencing form.

pub mod context;
pub mod domain;
pub mod lookup;
pub mod resolve;
pub mod storage;

pub use context::{ChangeToken, DomainHost, ResolutionContext};
pub use domain::codec::{decode_domain, encode_domain};
pub use domain::{Domain, DomainGraph};
pub use lookup::{LookupChain, LookupId, StorageLayout};
pub use resolve::{satisfy_dependency_domain, BundleIdentifierHolder, DomainResolution};
pub use storage::{BundleInfo, BundleStorageView};
