use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;

/// Metric kind, selecting the payload type and the merge semantics.
///
/// Gauges are point-in-time measurements where new values replace old ones;
/// counters accumulate, so an incoming value is a delta added to the stored
/// total.
///
/// # Examples
///
/// ```
/// use statmon_common::types::MetricKind;
///
/// let kind: MetricKind = "counter".parse().unwrap();
/// assert_eq!(kind, MetricKind::Counter);
/// assert_eq!(kind.to_string(), "counter");
/// assert!("histogram".parse::<MetricKind>().is_err());
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Gauge,
    Counter,
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricKind::Gauge => write!(f, "gauge"),
            MetricKind::Counter => write!(f, "counter"),
        }
    }
}

impl std::str::FromStr for MetricKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gauge" => Ok(MetricKind::Gauge),
            "counter" => Ok(MetricKind::Counter),
            _ => Err(format!("unknown metric kind: {s}")),
        }
    }
}

/// A metric payload: exactly one of a gauge value or a counter delta.
///
/// On the wire this is the tagged form `{"type": "gauge", "value": 1.5}` /
/// `{"type": "counter", "delta": 3}`; a payload that is missing, doubled,
/// or mismatched with its `type` tag is rejected at decode time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(try_from = "WireValue", into = "WireValue")]
pub enum MetricValue {
    Gauge(f64),
    Counter(i64),
}

impl MetricValue {
    pub fn kind(&self) -> MetricKind {
        match self {
            MetricValue::Gauge(_) => MetricKind::Gauge,
            MetricValue::Counter(_) => MetricKind::Counter,
        }
    }

    pub fn as_gauge(&self) -> Option<f64> {
        match self {
            MetricValue::Gauge(v) => Some(*v),
            MetricValue::Counter(_) => None,
        }
    }

    pub fn as_counter(&self) -> Option<i64> {
        match self {
            MetricValue::Counter(d) => Some(*d),
            MetricValue::Gauge(_) => None,
        }
    }

    /// Decimal text rendering of the payload, as used by the signing label
    /// and the path-style endpoints.
    pub fn text(&self) -> String {
        match self {
            MetricValue::Gauge(v) => format!("{v}"),
            MetricValue::Counter(d) => format!("{d}"),
        }
    }

    /// Parses a payload from its decimal text rendering for the given kind.
    pub fn parse(kind: MetricKind, text: &str) -> Result<Self, String> {
        match kind {
            MetricKind::Gauge => text
                .parse::<f64>()
                .map(MetricValue::Gauge)
                .map_err(|_| format!("invalid gauge value: {text}")),
            MetricKind::Counter => text
                .parse::<i64>()
                .map(MetricValue::Counter)
                .map_err(|_| format!("invalid counter delta: {text}")),
        }
    }
}

/// Raw wire form of [`MetricValue`], kept separate so the in-memory type
/// can stay a sum type while the JSON stays compatible with existing
/// clients.
#[derive(Clone, Serialize, Deserialize)]
struct WireValue {
    #[serde(rename = "type")]
    kind: MetricKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    delta: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<f64>,
}

impl TryFrom<WireValue> for MetricValue {
    type Error = String;

    fn try_from(wire: WireValue) -> Result<Self, Self::Error> {
        match (wire.kind, wire.value, wire.delta) {
            (MetricKind::Gauge, Some(v), None) => Ok(MetricValue::Gauge(v)),
            (MetricKind::Gauge, _, _) => Err("gauge metric requires a value payload".to_string()),
            (MetricKind::Counter, None, Some(d)) => Ok(MetricValue::Counter(d)),
            (MetricKind::Counter, _, _) => {
                Err("counter metric requires a delta payload".to_string())
            }
        }
    }
}

impl From<MetricValue> for WireValue {
    fn from(value: MetricValue) -> Self {
        match value {
            MetricValue::Gauge(v) => WireValue {
                kind: MetricKind::Gauge,
                delta: None,
                value: Some(v),
            },
            MetricValue::Counter(d) => WireValue {
                kind: MetricKind::Counter,
                delta: Some(d),
                value: None,
            },
        }
    }
}

/// A named metric as carried by the batch and single-metric endpoints.
///
/// `signature` is the hex HMAC-SHA256 of the metric (wire field `hash`),
/// present when a signing key is configured on the sender.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Metric {
    pub id: String,
    #[serde(flatten)]
    pub value: MetricValue,
    #[serde(rename = "hash", default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl Metric {
    pub fn new(id: impl Into<String>, value: MetricValue) -> Self {
        Self {
            id: id.into(),
            value,
            signature: None,
        }
    }
}

/// Full point-in-time dump of a store: kind → name → value.
///
/// Also the persisted snapshot format (JSON file / relational tables); at
/// most one entry per (kind, name), counters as cumulative totals.
pub type MetricsDump = BTreeMap<MetricKind, BTreeMap<String, MetricValue>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gauge_wire_roundtrip() {
        let metric = Metric::new("HeapAlloc", MetricValue::Gauge(100.5));
        let json = serde_json::to_string(&metric).unwrap();
        assert_eq!(json, r#"{"id":"HeapAlloc","type":"gauge","value":100.5}"#);

        let back: Metric = serde_json::from_str(&json).unwrap();
        assert_eq!(back.value, MetricValue::Gauge(100.5));
        assert!(back.signature.is_none());
    }

    #[test]
    fn counter_wire_roundtrip() {
        let metric = Metric::new("PollCount", MetricValue::Counter(7));
        let json = serde_json::to_string(&metric).unwrap();
        assert_eq!(json, r#"{"id":"PollCount","type":"counter","delta":7}"#);

        let back: Metric = serde_json::from_str(&json).unwrap();
        assert_eq!(back.value.as_counter(), Some(7));
    }

    #[test]
    fn signature_travels_as_hash_field() {
        let json = r#"{"id":"x","type":"counter","delta":1,"hash":"deadbeef"}"#;
        let metric: Metric = serde_json::from_str(json).unwrap();
        assert_eq!(metric.signature.as_deref(), Some("deadbeef"));
    }

    #[test]
    fn unknown_kind_rejected() {
        let err = serde_json::from_str::<Metric>(r#"{"id":"x","type":"histogram","value":1.0}"#);
        assert!(err.is_err());
    }

    #[test]
    fn mismatched_payload_rejected() {
        // counter tag with a gauge payload
        assert!(serde_json::from_str::<Metric>(r#"{"id":"x","type":"counter","value":1.0}"#)
            .is_err());
        // gauge tag with both payloads
        assert!(
            serde_json::from_str::<Metric>(r#"{"id":"x","type":"gauge","value":1.0,"delta":2}"#)
                .is_err()
        );
        // missing payload
        assert!(serde_json::from_str::<Metric>(r#"{"id":"x","type":"gauge"}"#).is_err());
    }

    #[test]
    fn value_text_parse_roundtrip() {
        let gauge = MetricValue::parse(MetricKind::Gauge, "200.25").unwrap();
        assert_eq!(gauge.text(), "200.25");
        let counter = MetricValue::parse(MetricKind::Counter, "42").unwrap();
        assert_eq!(counter.text(), "42");
        assert!(MetricValue::parse(MetricKind::Counter, "1.5").is_err());
    }
}
