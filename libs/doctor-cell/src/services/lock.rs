// libs/doctor-cell/src/services/lock.rs
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Config, Pool, Runtime};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::ScheduleError;

const RELEASE_SCRIPT: &str = r#"
if redis.call('get', KEYS[1]) == ARGV[1] then
    return redis.call('del', KEYS[1])
else
    return 0
end
"#;

/// Proof that the caller holds the schedule lock for one doctor.
pub enum DoctorLease {
    Local {
        doctor_id: Uuid,
        guard: OwnedMutexGuard<()>,
    },
    Redis {
        key: String,
        token: String,
    },
}

/// Serializes schedule writes per doctor, so two clinics editing the same
/// doctor cannot both pass the conflict check.
#[async_trait]
pub trait DoctorLockManager: Send + Sync {
    async fn acquire(&self, doctor_id: Uuid) -> Result<DoctorLease, ScheduleError>;

    async fn release(&self, lease: DoctorLease) -> Result<(), ScheduleError>;
}

/// One async mutex per doctor, valid within a single API process.
pub struct LocalDoctorLocks {
    locks: Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
    wait: Duration,
}

impl LocalDoctorLocks {
    pub fn new(wait: Duration) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            wait,
        }
    }

    fn slot(&self, doctor_id: Uuid) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(doctor_id).or_default().clone()
    }
}

impl Default for LocalDoctorLocks {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[async_trait]
impl DoctorLockManager for LocalDoctorLocks {
    async fn acquire(&self, doctor_id: Uuid) -> Result<DoctorLease, ScheduleError> {
        let slot = self.slot(doctor_id);
        let guard = timeout(self.wait, slot.lock_owned()).await.map_err(|_| {
            ScheduleError::Dependency(format!("Timed out waiting for schedule lock of doctor {}", doctor_id))
        })?;

        Ok(DoctorLease::Local { doctor_id, guard })
    }

    async fn release(&self, lease: DoctorLease) -> Result<(), ScheduleError> {
        let DoctorLease::Local { doctor_id, guard } = lease else {
            return Err(ScheduleError::Dependency("Lease was not issued by the local lock manager".to_string()));
        };
        drop(guard);

        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if locks.get(&doctor_id).is_some_and(|slot| Arc::strong_count(slot) == 1) {
            locks.remove(&doctor_id);
        }

        Ok(())
    }
}

/// Redis lease (`SET NX PX`) shared by every API instance. The lease expires on
/// its own if the holder dies before releasing it.
pub struct RedisDoctorLocks {
    pool: Pool,
    lease_ttl: Duration,
    wait: Duration,
}

impl RedisDoctorLocks {
    pub fn new(redis_url: &str, lease_ttl: Duration, wait: Duration) -> Result<Self, ScheduleError> {
        let pool = Config::from_url(redis_url)
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| ScheduleError::Dependency(format!("Failed to create Redis pool: {}", e)))?;

        info!("Redis schedule locks enabled");
        Ok(Self { pool, lease_ttl, wait })
    }

    fn key(doctor_id: Uuid) -> String {
        format!("doctor_schedule_lock:{}", doctor_id)
    }
}

fn redis_error(error: impl std::fmt::Display) -> ScheduleError {
    ScheduleError::Dependency(format!("Redis error: {}", error))
}

#[async_trait]
impl DoctorLockManager for RedisDoctorLocks {
    async fn acquire(&self, doctor_id: Uuid) -> Result<DoctorLease, ScheduleError> {
        let key = Self::key(doctor_id);
        let token = Uuid::new_v4().to_string();
        let deadline = Instant::now() + self.wait;

        let mut conn = self.pool.get().await.map_err(redis_error)?;

        loop {
            let acquired: Option<String> = redis::cmd("SET")
                .arg(&key)
                .arg(&token)
                .arg("NX")
                .arg("PX")
                .arg(self.lease_ttl.as_millis() as u64)
                .query_async(&mut conn)
                .await
                .map_err(redis_error)?;

            if acquired.is_some() {
                debug!("Acquired schedule lock {}", key);
                return Ok(DoctorLease::Redis { key, token });
            }

            if Instant::now() >= deadline {
                warn!("Gave up waiting for schedule lock {}", key);
                return Err(ScheduleError::Dependency(format!(
                    "Timed out waiting for schedule lock of doctor {}",
                    doctor_id
                )));
            }

            sleep(Duration::from_millis(50)).await;
        }
    }

    async fn release(&self, lease: DoctorLease) -> Result<(), ScheduleError> {
        let DoctorLease::Redis { key, token } = lease else {
            return Err(ScheduleError::Dependency("Lease was not issued by the Redis lock manager".to_string()));
        };

        let mut conn = self.pool.get().await.map_err(redis_error)?;
        let removed: i32 = redis::Script::new(RELEASE_SCRIPT)
            .key(&key)
            .arg(&token)
            .invoke_async(&mut conn)
            .await
            .map_err(redis_error)?;

        if removed == 0 {
            warn!("Schedule lock {} expired before release", key);
        }

        Ok(())
    }
}
