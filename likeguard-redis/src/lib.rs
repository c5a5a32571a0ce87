
use async_trait::async_trait;
use likeguard_core::{Identity, LikeError, LikeState, LikeStore, SubjectRef, ToggleOutcome};
use redis::{aio::ConnectionManager, AsyncCommands, Client, Script};
use std::sync::Arc;


pub struct RedisStore {
    connection: Arc<ConnectionManager>,
    toggle_script: Script,
}

impl RedisStore {
    pub async fn new(redis_url: &str) -> Result<Self, LikeError> {
        let client = Client::open(redis_url)
            .map_err(|e| LikeError::Store(format!("Redis client error: {}", e)))?;

        let connection = client
            .get_connection_manager()
            .await
            .map_err(|e| LikeError::Store(format!("Redis connection error: {}", e)))?;

        Ok(Self {
            connection: Arc::new(connection),
            toggle_script: Self::create_toggle_script(),
        })
    }

    // Ledger flip and counter move in one script, so a liked record always
    // means the counter was incremented exactly once for it. Unlike flips the
    // record to '0' rather than deleting it; only the admin clear removes
    // records. The decrement clamps at zero.
    fn create_toggle_script() -> Script {
        Script::new(
            r#"
            local record = KEYS[1]
            local counter = KEYS[2]

            local liked = redis.call('GET', record)
            if liked == '1' then
                redis.call('SET', record, '0')
                local count = tonumber(redis.call('GET', counter)) or 0
                if count > 0 then
                    count = redis.call('DECR', counter)
                else
                    redis.call('SET', counter, 0)
                    count = 0
                end
                return {0, count}
            else
                redis.call('SET', record, '1')
                local count = redis.call('INCR', counter)
                return {1, count}
            end
            "#,
        )
    }
}

#[async_trait]
impl LikeStore for RedisStore {
    async fn like_state(
        &self,
        subject: SubjectRef,
        identity: &Identity,
    ) -> Result<LikeState, LikeError> {
        let mut conn = self.connection.as_ref().clone();

        let record: Option<String> = conn
            .get(subject.ledger_key(identity))
            .await
            .map_err(|e| LikeError::Store(format!("Redis get error: {}", e)))?;
        let count: Option<u64> = conn
            .get(subject.counter_key())
            .await
            .map_err(|e| LikeError::Store(format!("Redis get error: {}", e)))?;

        Ok(LikeState {
            liked: record.as_deref() == Some("1"),
            count: count.unwrap_or(0),
        })
    }

    async fn toggle(
        &self,
        subject: SubjectRef,
        identity: &Identity,
    ) -> Result<ToggleOutcome, LikeError> {
        let mut conn = self.connection.as_ref().clone();

        let (liked, count): (i32, u64) = self
            .toggle_script
            .key(subject.ledger_key(identity))
            .key(subject.counter_key())
            .invoke_async(&mut conn)
            .await
            .map_err(|e| LikeError::Store(format!("Redis script execution error: {}", e)))?;

        Ok(ToggleOutcome {
            liked: liked == 1,
            count,
        })
    }

    async fn count(&self, subject: SubjectRef) -> Result<u64, LikeError> {
        let mut conn = self.connection.as_ref().clone();

        let count: Option<u64> = conn
            .get(subject.counter_key())
            .await
            .map_err(|e| LikeError::Store(format!("Redis get error: {}", e)))?;
        Ok(count.unwrap_or(0))
    }

    async fn clear_ledger(&self) -> Result<u64, LikeError> {
        let mut conn = self.connection.as_ref().clone();

        let keys: Vec<String> = {
            let mut iter = conn
                .scan_match::<_, String>(format!("{}*", SubjectRef::LEDGER_PREFIX))
                .await
                .map_err(|e| LikeError::Store(format!("Redis scan error: {}", e)))?;
            let mut keys = Vec::new();
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
            keys
        };

        if keys.is_empty() {
            return Ok(0);
        }

        let mut del_conn = self.connection.as_ref().clone();
        let deleted: u64 = del_conn
            .del(keys)
            .await
            .map_err(|e| LikeError::Store(format!("Redis delete error: {}", e)))?;
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use likeguard_core::SubjectKind;

    #[tokio::test]
    #[ignore] // Requires Redis instance
    async fn test_redis_store_toggle() {
        let store = RedisStore::new("redis://127.0.0.1").await.unwrap();
        let subject = SubjectRef::new(SubjectKind::Policy, 999_901);
        let identity = Identity::new("redis-test-fp").unwrap();

        let before = store.like_state(subject, &identity).await.unwrap();

        let on = store.toggle(subject, &identity).await.unwrap();
        assert!(on.liked);
        assert_eq!(on.count, before.count + 1);

        let off = store.toggle(subject, &identity).await.unwrap();
        assert!(!off.liked);
        assert_eq!(off.count, before.count);
    }

    #[tokio::test]
    #[ignore] // Requires Redis instance
    async fn test_redis_clear_ledger() {
        let store = RedisStore::new("redis://127.0.0.1").await.unwrap();
        let subject = SubjectRef::new(SubjectKind::Campaign, 999_902);
        let identity = Identity::new("redis-clear-fp").unwrap();

        store.toggle(subject, &identity).await.unwrap();
        let deleted = store.clear_ledger().await.unwrap();
        assert!(deleted >= 1);

        let state = store.like_state(subject, &identity).await.unwrap();
        assert!(!state.liked);
    }
}
