// strata-common/src/dependency/mod.rs

pub mod definition;

pub use definition::{
    BundleDependency, BundleDependencyInformation, BundleDependencyList, DependencyKind,
};
