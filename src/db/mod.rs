use std::path::Path;
use std::sync::LazyLock;

use log::info;
use regex::Regex;
use sqlx::{SqlitePool, sqlite::*};

pub mod crud;
pub mod model;

pub use model::*;

pub type Database = SqlitePool;

/// 表名只允许小写字母、数字和下划线，且不能以数字开头
///
/// SQLite 的表名不区分大小写，而 face_table 中的表名区分大小写。
static TABLE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^[a-z_][a-z0-9_]*$").expect("failed to build regex"));

/// 打开向量库目录下的数据库，目录不存在时自动创建
pub async fn init_db(dir: impl AsRef<Path>, filename: impl AsRef<Path>) -> anyhow::Result<Database> {
    std::fs::create_dir_all(dir.as_ref())?;
    connect(filename.as_ref(), true).await
}

/// 打开已有的数据库，不会创建任何文件
pub async fn open_db(filename: impl AsRef<Path>) -> anyhow::Result<Database> {
    connect(filename.as_ref(), false).await
}

async fn connect(filename: &Path, create: bool) -> anyhow::Result<Database> {
    info!("初始化数据库连接: {}", filename.display());

    let options = SqliteConnectOptions::new()
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .filename(filename)
        .create_if_missing(create);

    let pool = SqlitePool::connect_with(options).await?;

    info!("检查数据库迁移");
    sqlx::migrate!().run(&pool).await?;

    Ok(pool)
}

pub fn check_table_name(name: &str) -> anyhow::Result<()> {
    if !TABLE_NAME.is_match(name) {
        anyhow::bail!("无效的表名: {:?}", name);
    }
    if name.starts_with("sqlite_") || name == "face_table" || name.starts_with("_sqlx") {
        anyhow::bail!("保留的表名: {:?}", name);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_table_name() {
        assert!(check_table_name("faces").is_ok());
        assert!(check_table_name("_faces_2").is_ok());
        assert!(check_table_name("").is_err());
        assert!(check_table_name("2faces").is_err());
        assert!(check_table_name("faces; DROP TABLE x").is_err());
        assert!(check_table_name("face_table").is_err());
        assert!(check_table_name("sqlite_master").is_err());
    }

    #[test]
    fn test_check_table_name_is_lowercase_only() {
        assert!(check_table_name("staff_2024").is_ok());
        assert!(check_table_name("Faces").is_err());
        assert!(check_table_name("FACES").is_err());
        assert!(check_table_name("_SQLX_MIGRATIONS").is_err());
        assert!(check_table_name("_sqlx_migrations").is_err());
        assert!(check_table_name("Face_Table").is_err());
        assert!(check_table_name("SQLITE_MASTER").is_err());
        assert!(check_table_name("fäces").is_err());
    }
}
