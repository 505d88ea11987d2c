// strata-core/src/domain/codec.rs

//! Self-referencing serialization of isolation domains.
//!
//! Domains may contain cycles, so nodes are numbered on first visit
//! and later occurrences are written as back references. Bundle keys
//! travel as `<bundle id>|<storage id>` using the configured storage
//! names of the lookup chain, which keeps the encoded form stable
//! across processes as long as the storage configuration matches.

use std::collections::HashMap;

use serde_json::{json, Map, Value};
use tracing::debug;

use strata_common::error::{Result, StrataError};
use strata_common::model::{BundleIdentifier, BundleKey};

use crate::lookup::LookupChain;

use super::{Domain, DomainEdge, DomainGraph, DomainNodeData};

const KEY_BUNDLE_KEY: &str = "@bk";
const KEY_INDEX: &str = "@i";
const KEY_BACKREF: &str = "@r";
const KEY_DEPENDENCIES: &str = "@d";
const KEY_PRIVATE: &str = "@p";

/// Serializes the domain to a JSON string that [`decode_domain`] can
/// reconstruct against an equally configured lookup chain.
pub fn encode_domain(domain: &Domain, chain: &LookupChain) -> Result<String> {
    let mut root = Map::new();
    root.insert(
        KEY_BUNDLE_KEY.into(),
        Value::String(bundle_key_identifier(domain.bundle_key(), chain)?),
    );
    let mut backrefs = HashMap::new();
    encode_node(domain, domain.index, &mut root, &mut backrefs, chain)?;
    Ok(Value::Object(root).to_string())
}

fn encode_node(
    domain: &Domain,
    index: usize,
    obj: &mut Map<String, Value>,
    backrefs: &mut HashMap<usize, u64>,
    chain: &LookupChain,
) -> Result<()> {
    if let Some(&backref) = backrefs.get(&index) {
        obj.insert(KEY_BACKREF.into(), json!(backref));
        return Ok(());
    }
    let id = backrefs.len() as u64;
    backrefs.insert(index, id);
    obj.insert(KEY_INDEX.into(), json!(id));

    let node = &domain.graph.nodes[index];
    if node.deps.is_empty() {
        return Ok(());
    }
    let mut deps = Vec::with_capacity(node.deps.len());
    for (key, edge) in &node.deps {
        let mut dep_obj = Map::new();
        if edge.private_scope {
            dep_obj.insert(KEY_PRIVATE.into(), json!(1));
        }
        dep_obj.insert(
            KEY_BUNDLE_KEY.into(),
            Value::String(bundle_key_identifier(key, chain)?),
        );
        encode_node(domain, edge.node, &mut dep_obj, backrefs, chain)?;
        deps.push(Value::Object(dep_obj));
    }
    obj.insert(KEY_DEPENDENCIES.into(), Value::Array(deps));
    Ok(())
}

fn bundle_key_identifier(key: &BundleKey, chain: &LookupChain) -> Result<String> {
    let storage_id = chain.storage_id_for(key.storage_view()).ok_or_else(|| {
        StrataError::Unavailable(format!("storage not found for bundle: {key}"))
    })?;
    Ok(format!("{}|{}", key.bundle_id(), storage_id))
}

/// Reconstructs a previously encoded domain. Returns `None` when the
/// input is malformed or refers to a storage the chain no longer
/// contains, in which case the caller falls back to a fresh
/// resolution.
pub fn decode_domain(encoded: &str, chain: &LookupChain) -> Option<Domain> {
    let value: Value = match serde_json::from_str(encoded) {
        Ok(v) => v,
        Err(e) => {
            debug!("failed to parse encoded domain: {e}");
            return None;
        }
    };
    let root_obj = value.as_object()?;
    let root_key = parse_bundle_key(root_obj.get(KEY_BUNDLE_KEY)?.as_str()?, chain)?;
    let mut nodes = Vec::new();
    let mut refs = HashMap::new();
    let root = decode_node(root_obj, root_key, &mut refs, &mut nodes, chain)?;
    Some(DomainGraph::from_nodes(nodes, root))
}

fn decode_node(
    obj: &Map<String, Value>,
    bundle: BundleKey,
    refs: &mut HashMap<u64, usize>,
    nodes: &mut Vec<DomainNodeData>,
    chain: &LookupChain,
) -> Option<usize> {
    if let Some(backref) = obj.get(KEY_BACKREF).and_then(Value::as_u64) {
        return refs.get(&backref).copied();
    }
    let id = obj.get(KEY_INDEX)?.as_u64()?;
    let index = nodes.len();
    nodes.push(DomainNodeData {
        bundle,
        deps: Vec::new(),
    });
    // register before the children so back references into this node
    // resolve while it is still being filled
    refs.insert(id, index);

    if let Some(deps) = obj.get(KEY_DEPENDENCIES).and_then(Value::as_array) {
        for dep in deps {
            let dep_obj = dep.as_object()?;
            let dep_key = parse_bundle_key(dep_obj.get(KEY_BUNDLE_KEY)?.as_str()?, chain)?;
            let child = decode_node(dep_obj, dep_key.clone(), refs, nodes, chain)?;
            let private_scope = dep_obj.get(KEY_PRIVATE).and_then(Value::as_u64) == Some(1);
            nodes[index].deps.push((
                dep_key,
                DomainEdge {
                    node: child,
                    private_scope,
                },
            ));
        }
    }
    Some(index)
}

fn parse_bundle_key(identifier: &str, chain: &LookupChain) -> Option<BundleKey> {
    let (bundle, storage_id) = identifier.split_once('|')?;
    let bundle_id = BundleIdentifier::parse(bundle).ok()?;
    let storage = chain.storage_view_for_id(storage_id)?;
    Some(BundleKey::new(storage.storage_view_key().clone(), bundle_id))
}

#[cfg(test)]
mod tests {
    use std::any::Any;
    use std::sync::Arc;

    use strata_common::error::{Result, StrataError};
    use strata_common::model::{BundleIdentifier, BundleKey, StorageViewKey};

    use crate::lookup::{LookupChain, StorageLayout};
    use crate::storage::{BundleInfo, BundleStorageView};

    use super::super::{DomainEdge, DomainGraph, DomainNodeData};
    use super::{decode_domain, encode_domain};

    struct EmptyStorage {
        key: StorageViewKey,
    }

    impl BundleStorageView for EmptyStorage {
        fn storage_view_key(&self) -> &StorageViewKey {
            &self.key
        }

        fn lookup_versions(&self, _ident: &BundleIdentifier) -> Option<Vec<BundleIdentifier>> {
            None
        }

        fn bundle_info(&self, ident: &BundleIdentifier) -> Result<BundleInfo> {
            Err(StrataError::Unavailable(ident.to_string()))
        }

        fn detect_changes(&self) -> Option<Box<dyn Any + Send>> {
            None
        }

        fn handle_changes(&self, _changes: Box<dyn Any + Send>) {}
    }

    fn chain() -> LookupChain {
        let storage: Arc<dyn BundleStorageView> = Arc::new(EmptyStorage {
            key: StorageViewKey::new("view"),
        });
        LookupChain::new(vec![StorageLayout::storage("main", storage)]).unwrap()
    }

    fn bk(id: &str) -> BundleKey {
        BundleKey::new(
            StorageViewKey::new("view"),
            BundleIdentifier::parse(id).unwrap(),
        )
    }

    fn graph(nodes: Vec<(&str, Vec<(usize, bool)>)>) -> super::Domain {
        let keys: Vec<BundleKey> = nodes.iter().map(|(id, _)| bk(id)).collect();
        let data = nodes
            .into_iter()
            .enumerate()
            .map(|(i, (_, deps))| DomainNodeData {
                bundle: keys[i].clone(),
                deps: deps
                    .into_iter()
                    .map(|(node, private_scope)| {
                        (
                            keys[node].clone(),
                            DomainEdge {
                                node,
                                private_scope,
                            },
                        )
                    })
                    .collect(),
            })
            .collect();
        DomainGraph::from_nodes(data, 0)
    }

    #[test]
    fn round_trip_tree() {
        let chain = chain();
        let domain = graph(vec![
            ("root-v1.0", vec![(1, false), (2, true)]),
            ("a-v1.0", vec![]),
            ("b-v2.0", vec![]),
        ]);
        let encoded = encode_domain(&domain, &chain).unwrap();
        let decoded = decode_domain(&encoded, &chain).unwrap();
        assert_eq!(domain, decoded);
    }

    #[test]
    fn round_trip_cycle() {
        let chain = chain();
        // root -> a -> b -> root, with a private edge in the cycle
        let domain = graph(vec![
            ("root-v1.0", vec![(1, false)]),
            ("a-v1.0", vec![(2, true)]),
            ("b-v1.0", vec![(0, false)]),
        ]);
        let encoded = encode_domain(&domain, &chain).unwrap();
        let decoded = decode_domain(&encoded, &chain).unwrap();
        assert_eq!(domain, decoded);
        assert_eq!(decoded.all_domains().len(), 3);
    }

    #[test]
    fn shared_node_is_back_referenced() {
        let chain = chain();
        // diamond: root -> a, b; both -> common
        let domain = graph(vec![
            ("root-v1.0", vec![(1, false), (2, false)]),
            ("a-v1.0", vec![(3, false)]),
            ("b-v1.0", vec![(3, false)]),
            ("common-v1.0", vec![]),
        ]);
        let encoded = encode_domain(&domain, &chain).unwrap();
        assert!(encoded.contains("\"@r\""));
        let decoded = decode_domain(&encoded, &chain).unwrap();
        assert_eq!(domain, decoded);
        // the shared node decodes to one arena slot, not two
        assert_eq!(decoded.all_domains().len(), 4);
    }

    #[test]
    fn unknown_storage_fails_softly() {
        let chain = chain();
        let encoded = r#"{"@bk":"root-v1.0|elsewhere","@i":0}"#;
        assert!(decode_domain(encoded, &chain).is_none());
    }

    #[test]
    fn malformed_input_fails_softly() {
        let chain = chain();
        assert!(decode_domain("not json", &chain).is_none());
        assert!(decode_domain("{}", &chain).is_none());
        assert!(decode_domain(r#"{"@bk":"root-v1.0|main"}"#, &chain).is_none());
    }

    #[test]
    fn private_flag_round_trips() {
        let chain = chain();
        let domain = graph(vec![("root-v1.0", vec![(1, true)]), ("p-v1.0", vec![])]);
        let encoded = encode_domain(&domain, &chain).unwrap();
        assert!(encoded.contains("\"@p\":1"));
        let decoded = decode_domain(&encoded, &chain).unwrap();
        let (_, _, private) = decoded.dependencies().next().unwrap();
        assert!(private);
    }
}
