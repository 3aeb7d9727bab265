/// SQL DDL for the archive database.
/// WAL mode + foreign keys enabled at connection time.
pub const SCHEMA_VERSION: u32 = 1;

/// Timestamps are stored as fixed-width UTC RFC 3339 strings
/// (`2026-02-10T12:00:00.000000Z`) so text order equals time order.
pub const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    conversation_id TEXT NOT NULL,
    started_at TEXT NOT NULL,
    ended_at TEXT,
    end_reason TEXT,
    message_count INTEGER NOT NULL DEFAULT 0,
    title TEXT NOT NULL DEFAULT '',
    summary TEXT NOT NULL DEFAULT '',
    tags TEXT NOT NULL DEFAULT '[]',
    metadata TEXT,
    carry_forward TEXT
);

CREATE TABLE IF NOT EXISTS archived_messages (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL,
    session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
    conversation_id TEXT NOT NULL,
    role TEXT NOT NULL CHECK (role IN ('user', 'assistant', 'tool', 'system')),
    content TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    token_count INTEGER NOT NULL DEFAULT 0,
    tool_call_id TEXT,
    archive_reason TEXT NOT NULL DEFAULT '',
    UNIQUE (session_id, id)
);

CREATE TABLE IF NOT EXISTS archived_tool_calls (
    id TEXT NOT NULL,
    session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
    conversation_id TEXT NOT NULL,
    tool_name TEXT NOT NULL,
    arguments TEXT NOT NULL DEFAULT '{}',
    result TEXT NOT NULL DEFAULT '',
    started_at TEXT NOT NULL,
    completed_at TEXT,
    PRIMARY KEY (session_id, id)
);

CREATE TABLE IF NOT EXISTS imports (
    foreign_id TEXT NOT NULL,
    source_type TEXT NOT NULL,
    session_id TEXT NOT NULL,
    imported_at TEXT NOT NULL,
    PRIMARY KEY (foreign_id, source_type)
);

CREATE TABLE IF NOT EXISTS temp_files (
    conversation_id TEXT NOT NULL,
    label TEXT NOT NULL,
    path TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (conversation_id, label)
);

CREATE VIRTUAL TABLE IF NOT EXISTS archived_messages_fts USING fts5(
    content,
    content = 'archived_messages',
    content_rowid = 'seq',
    tokenize = 'porter unicode61'
);

CREATE TRIGGER IF NOT EXISTS archived_messages_fts_insert AFTER INSERT ON archived_messages
BEGIN
    INSERT INTO archived_messages_fts(rowid, content) VALUES (NEW.seq, NEW.content);
END;

CREATE TRIGGER IF NOT EXISTS archived_messages_fts_delete AFTER DELETE ON archived_messages
BEGIN
    INSERT INTO archived_messages_fts(archived_messages_fts, rowid, content)
    VALUES ('delete', OLD.seq, OLD.content);
END;

CREATE INDEX IF NOT EXISTS idx_sessions_conversation ON sessions(conversation_id, started_at);
CREATE INDEX IF NOT EXISTS idx_sessions_started ON sessions(started_at);
CREATE INDEX IF NOT EXISTS idx_sessions_open ON sessions(ended_at) WHERE ended_at IS NULL;
CREATE INDEX IF NOT EXISTS idx_messages_session_ts ON archived_messages(session_id, timestamp);
CREATE INDEX IF NOT EXISTS idx_messages_conversation ON archived_messages(conversation_id);
CREATE INDEX IF NOT EXISTS idx_tool_calls_session ON archived_tool_calls(session_id, started_at);
CREATE INDEX IF NOT EXISTS idx_imports_session ON imports(session_id);

CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);
"#;

pub const PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;
PRAGMA busy_timeout = 5000;
PRAGMA synchronous = NORMAL;
"#;
