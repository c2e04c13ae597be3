use crate::{
    digest::digest_hex,
    encoding::{self, HexString},
    error::{Result, StratumError},
};
use arc_swap::ArcSwapOption;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{fmt, sync::Arc};
use tokio::sync::watch;

/// Mining job received from pool
///
/// Immutable once built. A newer job replaces it as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub height: u64,
    pub blob: HexString,

    /// Raw wire form, encoding is pool-defined
    pub target: String,

    pub seed_hash: HexString,
}

impl Job {
    /// Map a job object (`blob`, `job_id`, `target`, `height`, `seed_hash`)
    pub fn from_params(params: &Value) -> Result<Self> {
        // Serde would otherwise accept an array in struct field order
        if !params.is_object() {
            return Err(StratumError::MalformedFrame(format!(
                "job payload must be an object, got {}",
                params
            )));
        }

        Job::deserialize(params)
            .map_err(|e| StratumError::MalformedFrame(format!("invalid job payload: {}", e)))
    }

    /// Job from notification params in either object or positional form
    pub fn from_notification(params: &Value) -> Result<Self> {
        match params {
            Value::Array(positional) => Self::from_positional(positional),
            other => Self::from_params(other),
        }
    }

    /// Map positional params `[job_id, blob, target, height, seed_hash]`
    pub fn from_positional(params: &[Value]) -> Result<Self> {
        if params.len() < 5 {
            return Err(StratumError::MalformedFrame(format!(
                "job params need 5 entries, got {}",
                params.len()
            )));
        }

        let text = |idx: usize, name: &str| {
            params[idx]
                .as_str()
                .ok_or_else(|| StratumError::MalformedFrame(format!("invalid {}", name)))
        };

        Ok(Self {
            job_id: text(0, "job_id")?.to_string(),
            blob: HexString::from_hex(text(1, "blob")?)?,
            target: text(2, "target")?.to_string(),
            height: params[3]
                .as_u64()
                .ok_or_else(|| StratumError::MalformedFrame("invalid height".to_string()))?,
            seed_hash: HexString::from_hex(text(4, "seed_hash")?)?,
        })
    }

    /// SHA-256 of the blob, identifies the work independent of job id
    pub fn fingerprint(&self) -> String {
        digest_hex(self.blob.as_bytes())
    }

    /// Compact 32-bit target as sent by XMR pools (little-endian hex)
    pub fn target_value(&self) -> Result<u32> {
        encoding::to_u32(&encoding::decode(&self.target)?)
    }

    /// Share difficulty implied by a compact 32-bit target
    pub fn difficulty(&self) -> Option<u64> {
        match self.target_value() {
            Ok(0) | Err(_) => None,
            Ok(target) if self.target.len() == 8 => Some(u32::MAX as u64 / target as u64),
            Ok(_) => None,
        }
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Job {} (height {}, target {})", self.job_id, self.height, self.target)
    }
}

/// Holds the one current job.
///
/// Publishing swaps a single pointer, so readers see either the old job
/// or the new one in full. Readers keep their snapshot as long as they
/// like.
pub struct JobSlot {
    current: ArcSwapOption<Job>,
    generation: watch::Sender<u64>,
}

impl Default for JobSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl JobSlot {
    pub fn new() -> Self {
        let (generation, _) = watch::channel(0);
        Self {
            current: ArcSwapOption::empty(),
            generation,
        }
    }

    pub fn publish(&self, job: Job) -> Arc<Job> {
        let job = Arc::new(job);
        self.current.store(Some(job.clone()));
        self.generation.send_modify(|g| *g += 1);
        job
    }

    pub fn current(&self) -> Option<Arc<Job>> {
        self.current.load_full()
    }

    /// Drop the current job, e.g. when its session ends
    pub fn clear(&self) {
        if self.current.swap(None).is_some() {
            self.generation.send_modify(|g| *g += 1);
        }
    }

    /// Receiver that is marked changed on every publish or clear
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.generation.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn sample(job_id: &str, height: u64) -> Job {
        Job {
            job_id: job_id.to_string(),
            height,
            blob: HexString::from_hex("deadbeef").unwrap(),
            target: "ffffffff".to_string(),
            seed_hash: HexString::from_hex("cafebabe").unwrap(),
        }
    }

    #[test]
    fn test_job_from_params() {
        let job = Job::from_params(&json!({
            "blob": "deadbeef",
            "job_id": "j1",
            "target": "ffffffff",
            "height": 100,
            "seed_hash": "cafebabe",
            "algo": "rx/0"
        }))
        .unwrap();

        assert_eq!(job.job_id, "j1");
        assert_eq!(job.height, 100);
        assert_eq!(job.blob.as_bytes(), &[0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(job.seed_hash.as_bytes(), &[0xca, 0xfe, 0xba, 0xbe]);
        assert_eq!(job.target, "ffffffff");
    }

    #[test]
    fn test_job_missing_field() {
        for missing in ["blob", "job_id", "target", "height", "seed_hash"] {
            let mut params = json!({
                "blob": "00", "job_id": "j", "target": "ff", "height": 1, "seed_hash": "00"
            });
            params.as_object_mut().unwrap().remove(missing);

            let err = Job::from_params(&params).unwrap_err();
            assert!(matches!(err, StratumError::MalformedFrame(_)), "{}", missing);
        }
    }

    #[test]
    fn test_job_bad_hex_is_malformed() {
        let err = Job::from_params(&json!({
            "blob": "zz", "job_id": "j", "target": "ff", "height": 1, "seed_hash": "00"
        }))
        .unwrap_err();
        assert!(matches!(err, StratumError::MalformedFrame(_)));
    }

    #[test]
    fn test_job_from_positional() {
        let params = vec![json!("j2"), json!("0102"), json!("b88d0600"), json!(7), json!("ff")];
        let job = Job::from_positional(&params).unwrap();
        assert_eq!(job.job_id, "j2");
        assert_eq!(job.blob.as_bytes(), &[1, 2]);
        assert_eq!(job.height, 7);

        assert!(Job::from_positional(&params[..3]).is_err());
    }

    #[test]
    fn test_array_payload_needs_positional_mapping() {
        let in_field_order = json!(["j3", 7, "0102", "b88d0600", "ff"]);
        assert!(matches!(
            Job::from_params(&in_field_order),
            Err(StratumError::MalformedFrame(_))
        ));

        let positional = json!(["j3", "0102", "b88d0600", 7, "ff"]);
        let job = Job::from_notification(&positional).unwrap();
        assert_eq!(job.blob.as_bytes(), &[1, 2]);
        assert_eq!(job.height, 7);

        let object = json!({
            "blob": "0102", "job_id": "j3", "target": "b88d0600", "height": 7, "seed_hash": "ff"
        });
        assert_eq!(Job::from_notification(&object).unwrap(), job);
    }

    #[test]
    fn test_difficulty_from_compact_target() {
        let mut job = sample("1", 1);
        job.target = "b88d0600".to_string();
        assert_eq!(job.target_value().unwrap(), 0x00068db8);
        assert_eq!(job.difficulty(), Some(u32::MAX as u64 / 0x00068db8));

        job.target = "00000000".to_string();
        assert_eq!(job.difficulty(), None);

        job.target = "abc".to_string();
        assert!(matches!(job.target_value(), Err(StratumError::BufferTooShort { .. })));
    }

    #[test]
    fn test_fingerprint_follows_blob() {
        let a = sample("1", 1);
        let mut b = sample("2", 2);
        assert_eq!(a.fingerprint(), b.fingerprint());

        b.blob = HexString::from_hex("00").unwrap();
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
    }

    #[test]
    fn test_slot_replaces_job() {
        let slot = JobSlot::new();
        assert!(slot.current().is_none());

        slot.publish(sample("42", 42));
        assert_eq!(slot.current().unwrap().job_id, "42");

        let snapshot = slot.current().unwrap();
        slot.publish(sample("43", 43));
        assert_eq!(slot.current().unwrap().job_id, "43");
        assert_eq!(snapshot.job_id, "42");

        slot.clear();
        assert!(slot.current().is_none());
    }

    #[tokio::test]
    async fn test_slot_notifies_subscribers() {
        let slot = JobSlot::new();
        let mut rx = slot.subscribe();

        slot.publish(sample("1", 1));
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), 1);
    }

    #[test]
    fn test_concurrent_readers_never_see_mixed_job() {
        let slot = Arc::new(JobSlot::new());
        let done = Arc::new(AtomicBool::new(false));
        slot.publish(sample("42", 42));

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let slot = slot.clone();
                let done = done.clone();
                std::thread::spawn(move || {
                    while !done.load(Ordering::Relaxed) {
                        let job = slot.current().unwrap();
                        assert_eq!(job.job_id, job.height.to_string());
                    }
                })
            })
            .collect();

        for i in 0..10_000u64 {
            let height = if i % 2 == 0 { 43 } else { 42 };
            slot.publish(sample(&height.to_string(), height));
        }
        slot.publish(sample("43", 43));
        done.store(true, Ordering::Relaxed);

        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(slot.current().unwrap().job_id, "43");
    }
}
