use anyhow::{Result, ensure};
use sqlx::{Executor, Sqlite};

use super::{FaceRecord, TableSchema, check_table_name};

/// 列出所有向量表
pub async fn table_names<'c, E>(executor: E) -> Result<Vec<String>>
where
    E: Executor<'c, Database = Sqlite>,
{
    let rows: Vec<(String,)> = sqlx::query_as("SELECT name FROM face_table ORDER BY name")
        .fetch_all(executor)
        .await?;
    Ok(rows.into_iter().map(|(name,)| name).collect())
}

/// 获取向量表的结构信息，表不存在时返回 None
pub async fn get_schema<'c, E>(executor: E, name: &str) -> Result<Option<TableSchema>>
where
    E: Executor<'c, Database = Sqlite>,
{
    let row: Option<(String, i64, String, String)> = sqlx::query_as(
        r#"
        SELECT name, dim, embedder, preprocess FROM face_table WHERE name = ?
        "#,
    )
    .bind(name)
    .fetch_optional(executor)
    .await?;

    Ok(row.map(|(name, dim, embedder, preprocess)| TableSchema { name, dim, embedder, preprocess }))
}

/// 删除向量表及其结构信息，表不存在时什么也不做
pub async fn drop_table(conn: &mut sqlx::SqliteConnection, name: &str) -> Result<()> {
    check_table_name(name)?;
    sqlx::query(&format!(r#"DROP TABLE IF EXISTS "{}""#, name)).execute(&mut *conn).await?;
    sqlx::query("DELETE FROM face_table WHERE name = ?").bind(name).execute(&mut *conn).await?;
    Ok(())
}

/// 创建向量表并记录结构信息
pub async fn create_table(conn: &mut sqlx::SqliteConnection, schema: &TableSchema) -> Result<()> {
    check_table_name(&schema.name)?;
    ensure!(schema.dim > 0, "向量维度必须大于 0");
    sqlx::query(&format!(
        r#"
        CREATE TABLE "{}" (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            label      TEXT NOT NULL,
            embedding  BLOB NOT NULL,
            image_path TEXT NOT NULL
        )
        "#,
        schema.name
    ))
    .execute(&mut *conn)
    .await?;
    sqlx::query(
        r#"
        INSERT INTO face_table (name, dim, embedder, preprocess)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(&schema.name)
    .bind(schema.dim)
    .bind(&schema.embedder)
    .bind(&schema.preprocess)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// 添加一条记录，向量维度必须与表结构一致
pub async fn add_record<'c, E>(executor: E, schema: &TableSchema, record: &FaceRecord) -> Result<()>
where
    E: Executor<'c, Database = Sqlite>,
{
    check_table_name(&schema.name)?;
    ensure!(
        record.embedding.len() as i64 == schema.dim,
        "向量维度不匹配: {} 的维度为 {}，表 {} 的维度为 {}",
        record.image_path,
        record.embedding.len(),
        schema.name,
        schema.dim
    );
    let embedding: &[u8] = bytemuck::cast_slice(&record.embedding);
    sqlx::query(&format!(
        r#"INSERT INTO "{}" (label, embedding, image_path) VALUES (?, ?, ?)"#,
        schema.name
    ))
    .bind(&record.label)
    .bind(embedding)
    .bind(&record.image_path)
    .execute(executor)
    .await?;
    Ok(())
}

/// 按插入顺序读取全部记录
pub async fn get_records<'c, E>(executor: E, name: &str) -> Result<Vec<FaceRecord>>
where
    E: Executor<'c, Database = Sqlite>,
{
    check_table_name(name)?;
    let rows: Vec<(String, Vec<u8>, String)> = sqlx::query_as(&format!(
        r#"SELECT label, embedding, image_path FROM "{}" ORDER BY id ASC"#,
        name
    ))
    .fetch_all(executor)
    .await?;

    rows.into_iter()
        .map(|(label, embedding, image_path)| {
            ensure!(embedding.len() % 4 == 0, "向量数据已损坏: {}", image_path);
            let embedding = bytemuck::pod_collect_to_vec::<u8, f32>(&embedding);
            Ok(FaceRecord { label, embedding, image_path })
        })
        .collect()
}

/// 查询记录数量
pub async fn count_records<'c, E>(executor: E, name: &str) -> Result<i64>
where
    E: Executor<'c, Database = Sqlite>,
{
    check_table_name(name)?;
    let (count,): (i64,) = sqlx::query_as(&format!(r#"SELECT COUNT(*) FROM "{}""#, name))
        .fetch_one(executor)
        .await?;
    Ok(count)
}

/// 按人物统计记录数量，按首次出现的顺序排列
pub async fn count_by_label<'c, E>(executor: E, name: &str) -> Result<Vec<(String, i64)>>
where
    E: Executor<'c, Database = Sqlite>,
{
    check_table_name(name)?;
    let rows: Vec<(String, i64)> = sqlx::query_as(&format!(
        r#"SELECT label, COUNT(*) FROM "{}" GROUP BY label ORDER BY MIN(id) ASC"#,
        name
    ))
    .fetch_all(executor)
    .await?;
    Ok(rows)
}
