use std::sync::Mutex;

use redis::Commands;
use tracing::debug;

use crate::error::StoreResult;
use crate::pattern::KeyPattern;
use crate::traits::Backend;

/// Remote key-value backend on a Redis-compatible server.
///
/// Every primitive maps onto the server's native command, including glob
/// filtering (`KEYS pattern`) and `EXISTS`. The connection is opened once and
/// serialized behind a mutex.
pub struct RedisBackend {
    url: String,
    conn: Mutex<redis::Connection>,
}

impl RedisBackend {
    pub fn open(url: &str) -> StoreResult<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection()?;
        debug!(url, "opened redis backend");
        Ok(Self {
            url: url.to_string(),
            conn: Mutex::new(conn),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Backend for RedisBackend {
    fn describe(&self) -> String {
        format!("redis at {}", self.url)
    }

    fn set(&self, key: &str, data: &[u8]) -> StoreResult<()> {
        let mut conn = self.conn.lock().expect("lock poisoned");
        conn.set::<_, _, ()>(key, data)?;
        Ok(())
    }

    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let mut conn = self.conn.lock().expect("lock poisoned");
        Ok(conn.get::<_, Option<Vec<u8>>>(key)?)
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        let mut conn = self.conn.lock().expect("lock poisoned");
        conn.del::<_, ()>(key)?;
        Ok(())
    }

    fn flush(&self) -> StoreResult<()> {
        let mut conn = self.conn.lock().expect("lock poisoned");
        redis::cmd("FLUSHDB").query::<()>(&mut *conn)?;
        Ok(())
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        let mut conn = self.conn.lock().expect("lock poisoned");
        Ok(conn.keys::<_, Vec<String>>("*")?)
    }

    fn exists(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.conn.lock().expect("lock poisoned");
        Ok(conn.exists::<_, bool>(key)?)
    }

    fn keys_matching(&self, pattern: &KeyPattern) -> StoreResult<Vec<String>> {
        let mut conn = self.conn.lock().expect("lock poisoned");
        Ok(conn.keys::<_, Vec<String>>(pattern.as_str())?)
    }
}

impl std::fmt::Debug for RedisBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBackend").field("url", &self.url).finish()
    }
}
