//! 对话持久化：SQLite 追加式消息日志
//!
//! 按 thread_id 存放消息，仅追加；启动时打开一次连接并持有到进程结束，
//! 每批追加在单个事务内提交，append 返回即表示已落盘；重启时整体加载恢复。

use std::path::Path;

use rusqlite::{params, Connection};
use tokio::sync::Mutex;

use crate::core::AgentError;
use crate::memory::Message;

/// SQLite 对话存储：单写者（仅 Turn Controller 追加）
pub struct ConversationStore {
    conn: Mutex<Connection>,
}

impl ConversationStore {
    /// 打开（必要时创建）数据库并建表；失败视为 StoreUnavailable，进程不应继续
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, AgentError> {
        if let Some(parent) = db_path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| AgentError::StoreUnavailable(e.to_string()))?;
            }
        }
        let conn = Connection::open(db_path.as_ref())
            .map_err(|e| AgentError::StoreUnavailable(e.to_string()))?;

        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| AgentError::StoreUnavailable(e.to_string()))?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                thread_id TEXT NOT NULL,
                role TEXT NOT NULL,
                payload TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_messages_thread ON messages(thread_id);",
        )
        .map_err(|e| AgentError::StoreUnavailable(e.to_string()))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// 追加一批消息：单事务提交，提交成功后才返回
    pub async fn append(&self, thread_id: &str, messages: &[Message]) -> Result<(), AgentError> {
        if messages.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.lock().await;
        let tx = conn
            .transaction()
            .map_err(|e| AgentError::Store(e.to_string()))?;
        let now = chrono::Utc::now().to_rfc3339();
        for msg in messages {
            let payload =
                serde_json::to_string(msg).map_err(|e| AgentError::Store(e.to_string()))?;
            let role = format!("{:?}", msg.role).to_lowercase();
            tx.execute(
                "INSERT INTO messages (thread_id, role, payload, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![thread_id, role, payload, now],
            )
            .map_err(|e| AgentError::Store(e.to_string()))?;
        }
        tx.commit().map_err(|e| AgentError::Store(e.to_string()))
    }

    /// 整体加载某线程的历史，按追加顺序返回；线程不存在时返回空 Vec
    pub async fn load(&self, thread_id: &str) -> Result<Vec<Message>, AgentError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare("SELECT payload FROM messages WHERE thread_id = ?1 ORDER BY id ASC")
            .map_err(|e| AgentError::Store(e.to_string()))?;
        let rows = stmt
            .query_map(params![thread_id], |row| row.get::<_, String>(0))
            .map_err(|e| AgentError::Store(e.to_string()))?;

        let mut messages = Vec::new();
        for row in rows {
            let payload = row.map_err(|e| AgentError::Store(e.to_string()))?;
            let msg: Message =
                serde_json::from_str(&payload).map_err(|e| AgentError::Store(e.to_string()))?;
            messages.push(msg);
        }
        Ok(messages)
    }

    /// 某线程当前的消息条数
    pub async fn message_count(&self, thread_id: &str) -> Result<usize, AgentError> {
        let conn = self.conn.lock().await;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM messages WHERE thread_id = ?1",
                params![thread_id],
                |row| row.get(0),
            )
            .map_err(|e| AgentError::Store(e.to_string()))?;
        Ok(count as usize)
    }

    /// 关闭前把 WAL 刷回主库，保证重启进程看到完整一致的历史
    pub async fn checkpoint(&self) -> Result<(), AgentError> {
        let conn = self.conn.lock().await;
        conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")
            .map_err(|e| AgentError::Store(e.to_string()))
    }
}
