use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

use crate::challenge::model::{Challenge, ConsumeOutcome, Predicate};

type HmacSha256 = Hmac<Sha256>;

/// Number of entries an opportunistic sweep inspects on every mutation,
/// bounding the cost added to the caller's critical section (§4.6).
const OPPORTUNISTIC_SWEEP_LIMIT: usize = 16;

struct Entry {
    challenge: Challenge,
    consumed: bool,
}

/// Process-wide mapping from challenge id to Challenge record (§4.6).
/// `issue`/`consume` are serialized by a single store-level mutex; `lookup`
/// only needs a read of the same mutex since the map is small and held for
/// O(1) work. Linearizable per id by construction: there is exactly one
/// mutex guarding all entries.
pub struct ChallengeStore {
    entries: Mutex<HashMap<String, Entry>>,
    secret: Vec<u8>,
    ttl_seconds: i64,
    predicate_count: usize,
}

impl ChallengeStore {
    pub fn new(secret: &str, ttl_seconds: i64, predicate_count: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            secret: secret.as_bytes().to_vec(),
            ttl_seconds,
            predicate_count: predicate_count.max(1),
        }
    }

    pub fn issue(&self) -> Challenge {
        let id = uuid::Uuid::new_v4().to_string();
        let nonce = random_hex_nonce();
        let predicates = random_predicates(self.predicate_count);
        let now = wall_clock_now();
        let expires_at = now + self.ttl_seconds;

        let signature = self.sign(&id, &nonce, &predicates, expires_at);

        let challenge = Challenge {
            id: id.clone(),
            predicates,
            issued_at: now,
            expires_at,
            nonce,
            signature,
        };

        let mut entries = self.entries.lock().expect("challenge store poisoned");
        sweep_expired(&mut entries, now);
        entries.insert(
            id,
            Entry {
                challenge: challenge.clone(),
                consumed: false,
            },
        );

        challenge
    }

    pub fn lookup(&self, id: &str) -> Option<Challenge> {
        let mut entries = self.entries.lock().expect("challenge store poisoned");
        let now = wall_clock_now();

        match entries.get(id) {
            Some(entry) if entry.challenge.is_expired(now) => {
                entries.remove(id);
                None
            }
            Some(entry) => Some(entry.challenge.clone()),
            None => None,
        }
    }

    /// Atomically verifies the HMAC and, on match and non-expiry, marks the
    /// challenge consumed. A second call with the same id returns
    /// `AlreadyConsumed` (or `NotFound`/`Expired` once swept) — it never
    /// passes twice (§4.6, §8 invariant 2).
    pub fn consume(&self, id: &str, claimed_signature: &str) -> ConsumeOutcome {
        let mut entries = self.entries.lock().expect("challenge store poisoned");
        let now = wall_clock_now();
        sweep_expired(&mut entries, now);

        let entry = match entries.get_mut(id) {
            Some(entry) => entry,
            None => return ConsumeOutcome::NotFound,
        };

        if entry.challenge.is_expired(now) {
            entries.remove(id);
            return ConsumeOutcome::Expired;
        }

        if entry.consumed {
            return ConsumeOutcome::AlreadyConsumed;
        }

        if !constant_time_eq(entry.challenge.signature.as_bytes(), claimed_signature.as_bytes()) {
            return ConsumeOutcome::InvalidSignature;
        }

        entry.consumed = true;
        ConsumeOutcome::Ok
    }

    /// Background sweep entry point, invoked periodically (default every
    /// 30s) to bound memory beyond the opportunistic per-mutation sweep.
    pub fn sweep(&self) {
        let mut entries = self.entries.lock().expect("challenge store poisoned");
        let now = wall_clock_now();
        entries.retain(|_, entry| !entry.challenge.is_expired(now));
    }

    fn sign(&self, id: &str, nonce: &str, predicates: &[Predicate], expires_at: i64) -> String {
        let payload = Challenge::signing_payload(id, nonce, predicates, expires_at);
        let mut mac = HmacSha256::new_from_slice(&self.secret).expect("hmac accepts any key length");
        mac.update(payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

fn sweep_expired(entries: &mut HashMap<String, Entry>, now: i64) {
    let expired: Vec<String> = entries
        .iter()
        .filter(|(_, e)| e.challenge.is_expired(now))
        .take(OPPORTUNISTIC_SWEEP_LIMIT)
        .map(|(id, _)| id.clone())
        .collect();
    for id in expired {
        entries.remove(&id);
    }
}

fn wall_clock_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_secs() as i64
}

fn random_hex_nonce() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn random_predicates(count: usize) -> Vec<Predicate> {
    const CHOICES: [Predicate; 3] = [Predicate::Blink, Predicate::TurnLeft, Predicate::TurnRight];
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|_| CHOICES[(rng.next_u32() as usize) % CHOICES.len()])
        .collect()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
