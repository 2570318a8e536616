use serde::{Deserialize, Serialize};

use wyre_core::types::PinRef;

use super::node::EXEC_IN;

/// A directed connection between two pins.
///
/// Endpoints serialize as `"node.pin"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    #[serde(with = "dotted")]
    pub from: PinRef,
    #[serde(with = "dotted")]
    pub to: PinRef,
    #[serde(default)]
    pub kind: EdgeKind,
}

/// Whether an edge carries control or a value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Exec,
    #[default]
    Data,
}

impl Edge {
    /// Control transfer from `from.pin` into `to`'s exec input.
    pub fn exec(from: impl Into<String>, pin: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: PinRef::new(from, pin),
            to: PinRef::new(to, EXEC_IN),
            kind: EdgeKind::Exec,
        }
    }

    /// Value flow from an output pin to an input pin.
    pub fn data(
        from: impl Into<String>,
        from_pin: impl Into<String>,
        to: impl Into<String>,
        to_pin: impl Into<String>,
    ) -> Self {
        Self {
            from: PinRef::new(from, from_pin),
            to: PinRef::new(to, to_pin),
            kind: EdgeKind::Data,
        }
    }
}

/// Parse `node.pin`, splitting at the last dot so node ids may contain dots.
pub fn parse_pin_ref(s: &str) -> Option<PinRef> {
    let (node, pin) = s.rsplit_once('.')?;
    if node.is_empty() || pin.is_empty() {
        return None;
    }
    Some(PinRef::new(node, pin))
}

mod dotted {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use wyre_core::types::PinRef;

    pub fn serialize<S: Serializer>(pin: &PinRef, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(pin)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<PinRef, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::parse_pin_ref(&s)
            .ok_or_else(|| de::Error::custom(format!("expected \"node.pin\", got \"{s}\"")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_edge_builders() {
        let e = Edge::exec("start", "exec_out", "end");
        assert_eq!(e.kind, EdgeKind::Exec);
        assert_eq!(e.to.to_string(), "end.exec_in");

        let d = Edge::data("sum", "result", "end", "result");
        assert_eq!(d.kind, EdgeKind::Data);
        assert_eq!(d.from, PinRef::new("sum", "result"));
    }

    #[test]
    fn test_edge_json_round_trip() {
        let edge: Edge = serde_json::from_value(json!({
            "from": "start.exec_out",
            "to": "end.exec_in",
            "kind": "exec"
        }))
        .unwrap();
        assert_eq!(edge.from, PinRef::new("start", "exec_out"));

        let text = serde_json::to_value(&edge).unwrap();
        assert_eq!(text["to"], json!("end.exec_in"));
    }

    #[test]
    fn test_edge_kind_defaults_to_data() {
        let edge: Edge = serde_json::from_value(json!({
            "from": "a.result",
            "to": "b.a"
        }))
        .unwrap();
        assert_eq!(edge.kind, EdgeKind::Data);
    }

    #[test]
    fn test_parse_pin_ref() {
        assert_eq!(
            parse_pin_ref("group.node.value"),
            Some(PinRef::new("group.node", "value"))
        );
        assert_eq!(parse_pin_ref("nodot"), None);
        assert_eq!(parse_pin_ref(".pin"), None);
        assert!(serde_json::from_value::<Edge>(json!({"from": "x", "to": "y.z"})).is_err());
    }
}
