use serde::{Deserialize, Serialize};

/// Closed set of liveness predicates a Challenge can demand (§3, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    Blink,
    TurnLeft,
    TurnRight,
}

impl Predicate {
    pub fn as_str(&self) -> &'static str {
        match self {
            Predicate::Blink => "blink",
            Predicate::TurnLeft => "turn_left",
            Predicate::TurnRight => "turn_right",
        }
    }
}

/// Immutable once written (§3): a Challenge never mutates in place, it is
/// only looked up, consumed, or evicted.
#[derive(Debug, Clone)]
pub struct Challenge {
    pub id: String,
    pub predicates: Vec<Predicate>,
    pub issued_at: i64,
    pub expires_at: i64,
    pub nonce: String,
    pub signature: String,
}

impl Challenge {
    pub fn is_expired(&self, now: i64) -> bool {
        now > self.expires_at
    }

    /// Canonical encoding signed by the Challenge Store: `id ‖ nonce ‖
    /// predicates ‖ expires-at` (§3).
    pub fn signing_payload(id: &str, nonce: &str, predicates: &[Predicate], expires_at: i64) -> String {
        let predicate_str = predicates
            .iter()
            .map(Predicate::as_str)
            .collect::<Vec<_>>()
            .join(",");
        format!("{id}|{nonce}|{predicate_str}|{expires_at}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeOutcome {
    Ok,
    Expired,
    InvalidSignature,
    NotFound,
    AlreadyConsumed,
}
