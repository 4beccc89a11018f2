/// Key-space prefixes used by [`crate::graph::GraphStore`].
///
/// A small, directly-constructed config struct rather than individual
/// strings threaded through every method.
#[derive(Debug, Clone)]
pub struct GraphConfig {
    pub node_prefix: String,
    pub edge_prefix: String,
    pub index_prefix: String,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            node_prefix: "node:".to_string(),
            edge_prefix: "edge:".to_string(),
            index_prefix: "index:".to_string(),
        }
    }
}

impl GraphConfig {
    pub fn node_key(&self, id: &str) -> String {
        format!("{}{}", self.node_prefix, id)
    }

    pub fn edge_key(&self, id: &str) -> String {
        format!("{}{}", self.edge_prefix, id)
    }

    /// `index:<property>:<value>:<nodeId>`
    pub fn index_key(&self, property: &str, value_repr: &str, node_id: &str) -> String {
        format!("{}{}:{}:{}", self.index_prefix, property, value_repr, node_id)
    }

    pub fn index_prefix_for_type(&self, node_type: &str) -> String {
        let repr = super::types::value_repr(&serde_json::Value::String(node_type.to_string()));
        self.index_prefix_for_property("type", &repr)
    }

    pub fn index_prefix_for_property(&self, property: &str, value_repr: &str) -> String {
        format!("{}{}:{}:", self.index_prefix, property, value_repr)
    }
}
