//! Redis-backed store.

use parking_lot::Mutex;
use redis::Commands;

use super::{Store, StoreError};

fn backend_err(err: redis::RedisError) -> StoreError {
    StoreError::Backend(err.to_string())
}

pub struct RedisStore {
    conn: Mutex<redis::Connection>,
}

impl RedisStore {
    pub fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(backend_err)?;
        let conn = client.get_connection().map_err(backend_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl Store for RedisStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.conn.lock().get(key).map_err(backend_err)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.conn.lock().set(key, value).map_err(backend_err)
    }

    fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let removed: i64 = self.conn.lock().del(key).map_err(backend_err)?;
        Ok(removed > 0)
    }

    fn incr(&self, key: &str) -> Result<u64, StoreError> {
        self.conn.lock().incr(key, 1u64).map_err(backend_err)
    }

    fn set_add(&self, key: &str, member: &str) -> Result<(), StoreError> {
        let _: i64 = self.conn.lock().sadd(key, member).map_err(backend_err)?;
        Ok(())
    }

    fn set_remove(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let removed: i64 = self.conn.lock().srem(key, member).map_err(backend_err)?;
        Ok(removed > 0)
    }

    fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        self.conn.lock().smembers(key).map_err(backend_err)
    }

    fn zadd(&self, key: &str, score: i64, member: &str) -> Result<(), StoreError> {
        let _: i64 = self
            .conn
            .lock()
            .zadd(key, member, score)
            .map_err(backend_err)?;
        Ok(())
    }

    fn zrem(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let removed: i64 = self.conn.lock().zrem(key, member).map_err(backend_err)?;
        Ok(removed > 0)
    }

    fn zrange_by_score(
        &self,
        key: &str,
        max: i64,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<String>, StoreError> {
        self.conn
            .lock()
            .zrangebyscore_limit(key, "-inf", max, offset as isize, limit as isize)
            .map_err(backend_err)
    }

    fn zrange(&self, key: &str, offset: usize, limit: usize) -> Result<Vec<String>, StoreError> {
        let stop = offset as isize + limit as isize - 1;
        self.conn
            .lock()
            .zrange(key, offset as isize, stop)
            .map_err(backend_err)
    }

    fn zcard(&self, key: &str) -> Result<u64, StoreError> {
        self.conn.lock().zcard(key).map_err(backend_err)
    }
}
