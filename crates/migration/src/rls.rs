//! Row-level security SQL builders.

use std::fmt;

/// RLS ポリシーのコマンドタイプ
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RlsCommand {
    Select,
    Insert,
    Update,
    Delete,
    All,
}

impl fmt::Display for RlsCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let command = match self {
            RlsCommand::Select => "SELECT",
            RlsCommand::Insert => "INSERT",
            RlsCommand::Update => "UPDATE",
            RlsCommand::Delete => "DELETE",
            RlsCommand::All => "ALL",
        };
        f.write_str(command)
    }
}

/// RLS ポリシーのロール
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RlsRole {
    Public,        // anonymous を含むすべてのユーザー
    Authenticated, // 認証済みユーザーのみ
    Anon,
    Custom(String),
}

impl fmt::Display for RlsRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RlsRole::Public => f.write_str("public"),
            RlsRole::Authenticated => f.write_str("authenticated"),
            RlsRole::Anon => f.write_str("anon"),
            RlsRole::Custom(role) => write!(f, "\"{}\"", role),
        }
    }
}

/// RLS ポリシーの設定
///
/// Postgres rejects a `USING` clause on INSERT policies, so `using` is optional
/// and `check` carries the row predicate for inserts.
#[derive(Debug, Clone)]
pub struct RlsPolicy {
    pub name: String,
    pub table: String,
    pub command: RlsCommand,
    pub role: RlsRole,
    pub using: Option<String>,
    pub check: Option<String>,
    pub schema: Option<String>,
}

impl RlsPolicy {
    /// Anyone may read every row.
    pub fn public_read(table: &str) -> Self {
        Self {
            name: format!("{} are viewable by everyone", table),
            table: table.to_string(),
            command: RlsCommand::Select,
            role: RlsRole::Public,
            using: Some("true".to_string()),
            check: None,
            schema: None,
        }
    }

    /// Only the user whose id is in `owner_column` may run `command`.
    pub fn owner_only(table: &str, owner_column: &str, command: RlsCommand) -> Self {
        let predicate = format!("auth.uid() = {}", owner_column);
        let (using, check) = match command {
            RlsCommand::Insert => (None, Some(predicate)),
            RlsCommand::Update | RlsCommand::All => (Some(predicate.clone()), Some(predicate)),
            RlsCommand::Select | RlsCommand::Delete => (Some(predicate), None),
        };

        Self {
            name: format!("owners can {} {}", command.to_string().to_lowercase(), table),
            table: table.to_string(),
            command,
            role: RlsRole::Authenticated,
            using,
            check,
            schema: None,
        }
    }

    fn qualified_table(&self) -> String {
        qualify(&self.table, self.schema.as_deref())
    }

    /// ポリシー作成 SQL を生成
    pub fn create_policy_sql(&self) -> String {
        let using_clause = self
            .using
            .as_ref()
            .map_or(String::new(), |expr| format!(" USING ({})", expr));
        let check_clause = self
            .check
            .as_ref()
            .map_or(String::new(), |expr| format!(" WITH CHECK ({})", expr));

        format!(
            "CREATE POLICY \"{}\" ON {} FOR {} TO {}{}{};",
            self.name,
            self.qualified_table(),
            self.command,
            self.role,
            using_clause,
            check_clause
        )
    }

    /// ポリシー削除 SQL を生成
    pub fn drop_policy_sql(&self) -> String {
        format!(
            "DROP POLICY IF EXISTS \"{}\" ON {};",
            self.name,
            self.qualified_table()
        )
    }
}

fn qualify(table: &str, schema: Option<&str>) -> String {
    format!("\"{}\".\"{}\"", schema.unwrap_or("public"), table)
}

/// テーブルの RLS を有効化する SQL を生成
pub fn enable_rls_sql(table: &str, schema: Option<&str>) -> String {
    format!(
        "ALTER TABLE {} ENABLE ROW LEVEL SECURITY;",
        qualify(table, schema)
    )
}

/// テーブルの RLS を無効化する SQL を生成
pub fn disable_rls_sql(table: &str, schema: Option<&str>) -> String {
    format!(
        "ALTER TABLE {} DISABLE ROW LEVEL SECURITY;",
        qualify(table, schema)
    )
}
