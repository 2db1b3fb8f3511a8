//! `GraphDescription` (spec §4.7): pure data, no GPU state. Grounded on
//! `original_source/include/merian-nodes/graph/graph_description.hpp`,
//! whose `add_node`/`remove_node`/`add_connection`/`remove_connection`/
//! `set_node_config`/`get_node_config`/`to_properties`/`from_properties`
//! shape this module mirrors directly.

use std::collections::BTreeMap;

use crate::error::{GraphError, GraphResult};
use crate::properties::Properties;

/// One node entry as the description tracks it: just enough to instantiate
/// and configure it, never any live GPU/resource state (spec §3's "Graph
/// description" row).
#[derive(Clone, Debug)]
pub struct NodeInfo {
    pub type_tag: String,
    pub disabled: bool,
    pub linearization_order: u32,
    pub config: serde_json::Value,
}

/// `(src, dst, dst_input)` uniquely identifies an edge: an input has at
/// most one producer, so `dst_input` alone (without `src_output`) is
/// sufficient to address it for removal — this is the shape
/// `remove_connection` uses in `original_source`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct EdgeKey {
    pub src: String,
    pub dst: String,
    pub dst_input: String,
}

#[derive(Clone, Debug)]
pub struct Connection {
    pub src_output: String,
}

#[derive(Clone, Debug, Default)]
pub struct GraphDescription {
    nodes: BTreeMap<String, NodeInfo>,
    edges: BTreeMap<EdgeKey, Connection>,
    next_anonymous_id: u64,
}

impl GraphDescription {
    pub fn new() -> Self {
        GraphDescription::default()
    }

    /// Adds a node, assigning a unique identifier when `identifier` is
    /// `None`. Fails `InvalidArgument` on collision (spec §4.7).
    pub fn add_node(
        &mut self,
        type_tag: impl Into<String>,
        identifier: Option<String>,
        config: serde_json::Value,
    ) -> GraphResult<String> {
        let identifier = match identifier {
            Some(id) => id,
            None => {
                let id = format!("node_{}", self.next_anonymous_id);
                self.next_anonymous_id += 1;
                id
            }
        };

        if self.nodes.contains_key(&identifier) {
            return Err(GraphError::invalid_argument(format!(
                "node identifier '{}' already exists",
                identifier
            )));
        }

        self.nodes.insert(
            identifier.clone(),
            NodeInfo {
                type_tag: type_tag.into(),
                disabled: false,
                linearization_order: 0,
                config,
            },
        );
        Ok(identifier)
    }

    /// Removes the node and every edge incident to it, returning whether a
    /// node with that identifier existed.
    pub fn remove_node(&mut self, identifier: &str) -> bool {
        if self.nodes.remove(identifier).is_none() {
            return false;
        }
        self.edges
            .retain(|key, _| key.src != identifier && key.dst != identifier);
        true
    }

    pub fn set_disabled(&mut self, identifier: &str, disabled: bool) -> GraphResult<()> {
        self.node_mut(identifier)?.disabled = disabled;
        Ok(())
    }

    pub fn set_linearization_order(&mut self, identifier: &str, order: u32) -> GraphResult<()> {
        self.node_mut(identifier)?.linearization_order = order;
        Ok(())
    }

    /// Records an edge between two already-added nodes. A connection
    /// carries no delay of its own — delay lives on the destination's
    /// `InputConnector`, only instantiated at `connect()` time — so this
    /// layer can't tell a delay-0 self-loop from a legitimate feedback edge;
    /// that distinction is made by the builder's topological sort over the
    /// delay-0 subgraph, which rejects a self-loop (or any cycle) that never
    /// drops its in-degree to zero.
    pub fn add_connection(
        &mut self,
        src: impl Into<String>,
        dst: impl Into<String>,
        src_output: impl Into<String>,
        dst_input: impl Into<String>,
    ) -> GraphResult<()> {
        let src = src.into();
        let dst = dst.into();
        let dst_input = dst_input.into();

        if !self.nodes.contains_key(&src) {
            return Err(GraphError::invalid_argument(format!("no such node '{}'", src)));
        }
        if !self.nodes.contains_key(&dst) {
            return Err(GraphError::invalid_argument(format!("no such node '{}'", dst)));
        }

        self.edges.insert(
            EdgeKey {
                src,
                dst,
                dst_input,
            },
            Connection {
                src_output: src_output.into(),
            },
        );
        Ok(())
    }

    pub fn remove_connection(&mut self, src: &str, dst: &str, dst_input: &str) -> bool {
        let key = EdgeKey {
            src: src.to_string(),
            dst: dst.to_string(),
            dst_input: dst_input.to_string(),
        };
        self.edges.remove(&key).is_some()
    }

    pub fn set_node_config(&mut self, identifier: &str, config: serde_json::Value) -> GraphResult<()> {
        self.node_mut(identifier)?.config = config;
        Ok(())
    }

    pub fn get_node_config(&self, identifier: &str) -> GraphResult<&serde_json::Value> {
        Ok(&self.node(identifier)?.config)
    }

    pub fn nodes(&self) -> impl Iterator<Item = (&str, &NodeInfo)> {
        self.nodes.iter().map(|(id, info)| (id.as_str(), info))
    }

    pub fn edges(&self) -> impl Iterator<Item = (&EdgeKey, &Connection)> {
        self.edges.iter()
    }

    fn node(&self, identifier: &str) -> GraphResult<&NodeInfo> {
        self.nodes
            .get(identifier)
            .ok_or_else(|| GraphError::invalid_argument(format!("no such node '{}'", identifier)))
    }

    fn node_mut(&mut self, identifier: &str) -> GraphResult<&mut NodeInfo> {
        self.nodes
            .get_mut(identifier)
            .ok_or_else(|| GraphError::invalid_argument(format!("no such node '{}'", identifier)))
    }

    /// Hash that changes iff *structural* content changes: nodes present,
    /// edges present, type tags, disabled flags, linearization order. Pure
    /// config changes must not perturb it (spec §4.7), which is why
    /// `config` is deliberately excluded from the hashed representation
    /// below.
    pub fn structural_hash(&self) -> u64 {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        for (id, info) in &self.nodes {
            id.hash(&mut hasher);
            info.type_tag.hash(&mut hasher);
            info.disabled.hash(&mut hasher);
            info.linearization_order.hash(&mut hasher);
        }
        for (key, conn) in &self.edges {
            key.src.hash(&mut hasher);
            key.dst.hash(&mut hasher);
            key.dst_input.hash(&mut hasher);
            conn.src_output.hash(&mut hasher);
        }
        hasher.finish()
    }

    /// Writes the full description through `props` (spec §4.7
    /// `to_properties`).
    pub fn to_properties(&self, props: &mut dyn Properties) {
        for (id, info) in &self.nodes {
            props.begin_child(id);
            let mut type_tag = info.type_tag.clone();
            props.text("type", &mut type_tag);
            let mut disabled = info.disabled;
            props.bool("disabled", &mut disabled);
            let mut order = info.linearization_order;
            props.u32("linearization_order", &mut order);
            let mut config = info.config.clone();
            props.json("config", &mut config);
            props.end_child();
        }

        for (key, conn) in &self.edges {
            let edge_id = format!("{}->{}:{}", key.src, key.dst, key.dst_input);
            props.begin_child(&edge_id);
            let mut src = key.src.clone();
            props.text("src", &mut src);
            let mut dst = key.dst.clone();
            props.text("dst", &mut dst);
            let mut src_output = conn.src_output.clone();
            props.text("src_output", &mut src_output);
            let mut dst_input = key.dst_input.clone();
            props.text("dst_input", &mut dst_input);
            props.end_child();
        }
    }

    /// Rebuilds a description from `props`; round-trips with
    /// `to_properties` (spec §8: `from_properties(to_properties(desc)) ≡
    /// desc`).
    pub fn from_properties(document: serde_json::Value) -> GraphResult<Self> {
        let object = document
            .as_object()
            .ok_or_else(|| GraphError::invalid_argument("graph description root is not an object"))?;

        let mut desc = GraphDescription::new();

        // Nodes first (entries without `src`/`dst` keys), then edges, so
        // `add_connection`'s existence checks always succeed regardless of
        // document ordering.
        for (id, entry) in object {
            if entry.get("src").is_some() {
                continue;
            }
            let type_tag = entry
                .get("type")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            let config = entry.get("config").cloned().unwrap_or(serde_json::Value::Null);
            desc.add_node(type_tag, Some(id.clone()), config)?;

            if let Some(disabled) = entry.get("disabled").and_then(|v| v.as_bool()) {
                desc.set_disabled(id, disabled)?;
            }
            if let Some(order) = entry.get("linearization_order").and_then(|v| v.as_u64()) {
                desc.set_linearization_order(id, order as u32)?;
            }
        }

        for entry in object.values() {
            let src = entry.get("src").and_then(|v| v.as_str());
            let dst = entry.get("dst").and_then(|v| v.as_str());
            let dst_input = entry.get("dst_input").and_then(|v| v.as_str());
            if let (Some(src), Some(dst), Some(dst_input)) = (src, dst, dst_input) {
                let src_output = entry.get("src_output").and_then(|v| v.as_str()).unwrap_or_default();
                desc.add_connection(src, dst, src_output, dst_input)?;
            }
        }

        Ok(desc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_node_assigns_unique_identifier_when_unspecified() {
        let mut desc = GraphDescription::new();
        let a = desc.add_node("ColorImage", None, serde_json::Value::Null).unwrap();
        let b = desc.add_node("ColorImage", None, serde_json::Value::Null).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn add_node_collision_fails() {
        let mut desc = GraphDescription::new();
        desc.add_node("ColorImage", Some("a".into()), serde_json::Value::Null).unwrap();
        let err = desc
            .add_node("ColorImage", Some("a".into()), serde_json::Value::Null)
            .unwrap_err();
        assert!(matches!(err, GraphError::InvalidArgument(_)));
    }

    #[test]
    fn remove_node_then_add_node_restores_structural_hash() {
        let mut desc = GraphDescription::new();
        let before = desc.structural_hash();
        desc.add_node("ColorImage", Some("a".into()), serde_json::Value::Null).unwrap();
        desc.remove_node("a");
        assert_eq!(before, desc.structural_hash());
    }

    #[test]
    fn connect_then_disconnect_restores_structural_hash() {
        let mut desc = GraphDescription::new();
        desc.add_node("ColorImage", Some("a".into()), serde_json::Value::Null).unwrap();
        desc.add_node("BlitExternal", Some("b".into()), serde_json::Value::Null).unwrap();
        let before = desc.structural_hash();
        desc.add_connection("a", "b", "color", "blit_src").unwrap();
        desc.remove_connection("a", "b", "blit_src");
        assert_eq!(before, desc.structural_hash());
    }

    #[test]
    fn config_only_change_does_not_perturb_structural_hash() {
        let mut desc = GraphDescription::new();
        desc.add_node("ColorImage", Some("a".into()), serde_json::Value::Null).unwrap();
        let before = desc.structural_hash();
        desc.set_node_config("a", serde_json::json!({"color": [1.0, 0.0, 0.0, 1.0]}))
            .unwrap();
        assert_eq!(before, desc.structural_hash());
    }

    #[test]
    fn round_trip_through_properties() {
        let mut desc = GraphDescription::new();
        desc.add_node("ColorImage", Some("a".into()), serde_json::json!({"extent": [64, 64]}))
            .unwrap();
        desc.add_node("BlitExternal", Some("b".into()), serde_json::Value::Null).unwrap();
        desc.add_connection("a", "b", "color", "blit_src").unwrap();

        let mut writer = crate::properties::JsonProperties::writer();
        desc.to_properties(&mut writer);
        let document = writer.into_document();

        let round_tripped = GraphDescription::from_properties(document).unwrap();
        assert_eq!(desc.structural_hash(), round_tripped.structural_hash());
    }
}
