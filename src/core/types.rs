//! Data types shared by the synchronizer, its sources and the view projection.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Opaque identifier of a scored agent.
pub type AgentId = String;

/// Trust score as reported by the service. No range is enforced.
pub type TrustScore = f64;

/// Latest known score per agent.
///
/// Entries keep the order in which each agent was first inserted. Updating
/// an existing agent replaces its score in place, so the insertion order is
/// stable for the lifetime of the map and can be used as a ranking
/// tie-breaker.
#[derive(Debug, Clone, Default)]
pub struct ScoreMap {
    entries: Vec<(AgentId, TrustScore)>,
    index: HashMap<AgentId, usize>,
}

impl ScoreMap {
    /// Create an empty score map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a `GET /trust` payload.
    ///
    /// The payload is expected to be a JSON object of agent -> number. Any
    /// other shape decodes to an empty map, and non-numeric values are
    /// skipped. Agents keep the key order of the payload.
    pub fn from_json_value(value: &serde_json::Value) -> Self {
        let Some(object) = value.as_object() else {
            return Self::new();
        };

        object
            .iter()
            .filter_map(|(agent, score)| score.as_f64().map(|s| (agent.clone(), s)))
            .collect()
    }

    /// Insert or overwrite the score for `agent`, returning the previous value.
    pub fn upsert(&mut self, agent: impl Into<AgentId>, score: TrustScore) -> Option<TrustScore> {
        let agent = agent.into();
        match self.index.get(&agent) {
            Some(&slot) => {
                let previous = self.entries[slot].1;
                self.entries[slot].1 = score;
                Some(previous)
            }
            None => {
                self.index.insert(agent.clone(), self.entries.len());
                self.entries.push((agent, score));
                None
            }
        }
    }

    /// Score for `agent`, if known.
    pub fn get(&self, agent: &str) -> Option<TrustScore> {
        self.index.get(agent).map(|&slot| self.entries[slot].1)
    }

    pub fn contains(&self, agent: &str) -> bool {
        self.index.contains_key(agent)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in first-insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, TrustScore)> {
        self.entries.iter().map(|(agent, score)| (agent.as_str(), *score))
    }

    /// Agent ids in first-insertion order.
    pub fn agents(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(agent, _)| agent.as_str())
    }
}

impl PartialEq for ScoreMap {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl FromIterator<(AgentId, TrustScore)> for ScoreMap {
    fn from_iter<I: IntoIterator<Item = (AgentId, TrustScore)>>(iter: I) -> Self {
        let mut map = ScoreMap::new();
        for (agent, score) in iter {
            map.upsert(agent, score);
        }
        map
    }
}

impl<'a> FromIterator<(&'a str, TrustScore)> for ScoreMap {
    fn from_iter<I: IntoIterator<Item = (&'a str, TrustScore)>>(iter: I) -> Self {
        iter.into_iter()
            .map(|(agent, score)| (agent.to_string(), score))
            .collect()
    }
}

/// One historical observation of an agent's score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimelinePoint {
    /// Seconds since the Unix epoch
    #[serde(with = "epoch_secs")]
    pub timestamp: i64,
    pub trust: TrustScore,
}

impl TimelinePoint {
    pub fn new(timestamp: i64, trust: TrustScore) -> Self {
        Self { timestamp, trust }
    }
}

/// Ordered history for one agent, oldest first.
pub type Timeline = Vec<TimelinePoint>;

/// Body of `GET /trust/timeline?agent=`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineResponse {
    pub agent: AgentId,
    #[serde(default)]
    pub timeline: Timeline,
}

/// A single trust adjustment.
///
/// Live channel messages always carry `trust`; the `/trust/events` history
/// endpoint only reports the delta, so the field is optional on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub agent: AgentId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trust: Option<TrustScore>,
    #[serde(default)]
    pub change: f64,
    #[serde(default)]
    pub reason: String,
    #[serde(with = "epoch_secs")]
    pub timestamp: i64,
}

impl ChangeEvent {
    /// Build a live event with an absolute score.
    pub fn new(
        agent: impl Into<AgentId>,
        trust: TrustScore,
        change: f64,
        reason: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        Self {
            agent: agent.into(),
            trust: Some(trust),
            change,
            reason: reason.into(),
            timestamp,
        }
    }

    /// Decode a push-channel text frame. Messages without an absolute score
    /// are rejected.
    pub fn from_live_message(text: &str) -> Result<Self, serde_json::Error> {
        let event: ChangeEvent = serde_json::from_str(text)?;
        if event.trust.is_none() {
            return Err(serde::de::Error::missing_field("trust"));
        }
        Ok(event)
    }

    /// The point this event contributes to its agent's timeline.
    pub fn timeline_point(&self) -> Option<TimelinePoint> {
        self.trust
            .map(|trust| TimelinePoint::new(self.timestamp, trust))
    }
}

/// Timestamps are integer seconds. The service writes them with
/// `time.time()` in places, so fractional values are accepted and truncated.
mod epoch_secs {
    use serde::{de, Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S>(secs: &i64, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_i64(*secs)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<i64, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct EpochVisitor;

        impl de::Visitor<'_> for EpochVisitor {
            type Value = i64;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("seconds since the Unix epoch")
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<i64, E> {
                Ok(v)
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<i64, E> {
                i64::try_from(v).map_err(|_| E::custom("timestamp out of range"))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<i64, E> {
                if v.is_finite() {
                    Ok(v.trunc() as i64)
                } else {
                    Err(E::custom("timestamp is not finite"))
                }
            }
        }

        deserializer.deserialize_any(EpochVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_score_map_keeps_first_insertion_order() {
        let mut map = ScoreMap::new();
        map.upsert("a", 0.1);
        map.upsert("b", 0.2);
        assert_eq!(map.upsert("a", 0.9), Some(0.1));

        let agents: Vec<&str> = map.agents().collect();
        assert_eq!(agents, vec!["a", "b"]);
        assert_eq!(map.get("a"), Some(0.9));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_score_map_from_malformed_payload() {
        assert!(ScoreMap::from_json_value(&json!([1, 2, 3])).is_empty());
        assert!(ScoreMap::from_json_value(&json!("nope")).is_empty());
        assert!(ScoreMap::from_json_value(&serde_json::Value::Null).is_empty());

        let map = ScoreMap::from_json_value(&json!({"a": 0.5, "b": "high", "c": 2}));
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("a"), Some(0.5));
        assert_eq!(map.get("c"), Some(2.0));
        assert!(!map.contains("b"));
    }

    #[test]
    fn test_score_map_keeps_payload_key_order() {
        let payload: serde_json::Value =
            serde_json::from_str(r#"{"zeta": 0.5, "alpha": 0.5, "mid": 0.7}"#).unwrap();
        let map = ScoreMap::from_json_value(&payload);

        let agents: Vec<&str> = map.agents().collect();
        assert_eq!(agents, vec!["zeta", "alpha", "mid"]);

        let ranking: Vec<String> = crate::core::projection::rank(&map)
            .into_iter()
            .map(|row| row.agent)
            .collect();
        assert_eq!(ranking, vec!["mid", "zeta", "alpha"]);
    }

    #[test]
    fn test_timeline_point_accepts_fractional_timestamps() {
        let point: TimelinePoint =
            serde_json::from_value(json!({"timestamp": 1700000000.75, "trust": 0.42})).unwrap();
        assert_eq!(point, TimelinePoint::new(1_700_000_000, 0.42));
    }

    #[test]
    fn test_live_message_requires_trust() {
        let ok = ChangeEvent::from_live_message(
            r#"{"agent":"x","trust":0.4,"change":0.05,"reason":"reward","timestamp":1000}"#,
        )
        .unwrap();
        assert_eq!(ok.timeline_point(), Some(TimelinePoint::new(1000, 0.4)));

        assert!(ChangeEvent::from_live_message(
            r#"{"agent":"x","change":0.05,"reason":"reward","timestamp":1000}"#
        )
        .is_err());
        assert!(ChangeEvent::from_live_message("subscribed").is_err());
    }
}
